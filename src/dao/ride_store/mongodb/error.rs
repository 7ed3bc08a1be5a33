use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Failures raised by the MongoDB ride store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to write ride `{id}`")]
    WriteRide {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load ride `{id}`")]
    LoadRide {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to list rides")]
    ListRides {
        #[source]
        source: MongoError,
    },
    #[error("failed to write profile `{user_id}`")]
    WriteProfile {
        user_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load profile `{user_id}`")]
    LoadProfile {
        user_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to access inbox of `{recipient_id}`")]
    Inbox {
        recipient_id: String,
        #[source]
        source: MongoError,
    },
    #[error("document `{id}` cannot be mapped: {message}")]
    CorruptDocument { id: String, message: String },
}
