#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{NotificationEntity, ProfileEntity, RideEntity, RidePatch};
use crate::dao::storage::StorageResult;
use crate::state::{lifecycle::RideStatus, session::ActorRole};
use futures::future::BoxFuture;
use uuid::Uuid;

/// Result of a ride update guarded by a status precondition.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The patch was written; carries the document as stored after the write.
    Applied(RideEntity),
    /// Another writer moved the ride first; nothing was written.
    StatusMismatch {
        /// Status found in the store at write time.
        actual: RideStatus,
    },
    /// No ride with this id exists.
    NotFound,
}

/// Abstraction over the document store backing rides, profiles, and inboxes.
///
/// `update_ride` is the only ride mutation. When `expected` is set, backends
/// must apply the patch atomically and only if the stored status equals it.
pub trait RideStore: Send + Sync {
    fn insert_ride(&self, ride: RideEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_ride(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RideEntity>>>;
    fn update_ride(
        &self,
        id: Uuid,
        patch: RidePatch,
        expected: Option<RideStatus>,
    ) -> BoxFuture<'static, StorageResult<UpdateOutcome>>;
    /// Rides in `status`, oldest first.
    fn list_rides_by_status(
        &self,
        status: RideStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<RideEntity>>>;
    /// Rides where `user_id` is the passenger or the rider, newest first.
    fn list_rides_for_user(
        &self,
        user_id: String,
        role: ActorRole,
    ) -> BoxFuture<'static, StorageResult<Vec<RideEntity>>>;

    fn find_profile(&self, user_id: String)
    -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>>;
    fn save_profile(&self, profile: ProfileEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Compare-and-swap on `total_ratings`; returns whether the write was applied.
    fn update_rider_rating(
        &self,
        user_id: String,
        expected_total: u32,
        rating: f64,
        total_ratings: u32,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    fn append_notification(
        &self,
        notification: NotificationEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Inbox of `recipient_id`, newest first.
    fn list_notifications(
        &self,
        recipient_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<NotificationEntity>>>;
    fn mark_notification_read(
        &self,
        recipient_id: String,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Delete the whole inbox, returning how many entries were removed.
    fn clear_notifications(&self, recipient_id: String) -> BoxFuture<'static, StorageResult<u64>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
