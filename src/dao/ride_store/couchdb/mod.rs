mod config;
mod error;
mod models;
mod store;

pub use config::CouchConfig;
pub use error::CouchDaoError;
pub use store::CouchRideStore;

use crate::dao::storage::StorageError;

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        match err {
            CouchDaoError::InvalidDocId { doc_id, kind } => StorageError::Corrupt {
                id: doc_id,
                message: kind.to_owned(),
            },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
