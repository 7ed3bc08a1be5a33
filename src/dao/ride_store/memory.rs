//! Process-local store used for development and tests.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{RideStore, UpdateOutcome};
use crate::{
    dao::{
        models::{NotificationEntity, ProfileEntity, RideEntity, RidePatch},
        storage::{StorageError, StorageResult},
    },
    state::{lifecycle::RideStatus, session::ActorRole},
};

/// Failures the in-memory store can simulate.
#[derive(Debug, Error)]
pub enum MemoryStoreError {
    /// Writes were switched off with [`MemoryRideStore::set_offline`].
    #[error("in-memory store is offline")]
    Offline,
}

impl From<MemoryStoreError> for StorageError {
    fn from(err: MemoryStoreError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}

#[derive(Default)]
struct MemoryInner {
    rides: HashMap<Uuid, RideEntity>,
    profiles: HashMap<String, ProfileEntity>,
    inboxes: HashMap<String, Vec<NotificationEntity>>,
}

/// Mutex-guarded maps; one lock covers the read-check-write of a conditional update.
#[derive(Clone, Default)]
pub struct MemoryRideStore {
    inner: Arc<Mutex<MemoryInner>>,
    offline: Arc<AtomicBool>,
}

impl MemoryRideStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), MemoryStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(MemoryStoreError::Offline)
        } else {
            Ok(())
        }
    }
}

impl RideStore for MemoryRideStore {
    fn insert_ride(&self, ride: RideEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            store.inner.lock().await.rides.insert(ride.id, ride);
            Ok(())
        })
    }

    fn find_ride(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RideEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store.inner.lock().await.rides.get(&id).cloned())
        })
    }

    fn update_ride(
        &self,
        id: Uuid,
        patch: RidePatch,
        expected: Option<RideStatus>,
    ) -> BoxFuture<'static, StorageResult<UpdateOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let mut guard = store.inner.lock().await;
            let Some(ride) = guard.rides.get_mut(&id) else {
                return Ok(UpdateOutcome::NotFound);
            };
            if let Some(expected) = expected {
                if ride.status != expected {
                    return Ok(UpdateOutcome::StatusMismatch {
                        actual: ride.status,
                    });
                }
            }
            patch.apply_to(ride);
            Ok(UpdateOutcome::Applied(ride.clone()))
        })
    }

    fn list_rides_by_status(
        &self,
        status: RideStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<RideEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let guard = store.inner.lock().await;
            let mut rides: Vec<RideEntity> = guard
                .rides
                .values()
                .filter(|ride| ride.status == status)
                .cloned()
                .collect();
            rides.sort_by_key(|ride| ride.created_at);
            Ok(rides)
        })
    }

    fn list_rides_for_user(
        &self,
        user_id: String,
        role: ActorRole,
    ) -> BoxFuture<'static, StorageResult<Vec<RideEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let guard = store.inner.lock().await;
            let mut rides: Vec<RideEntity> = guard
                .rides
                .values()
                .filter(|ride| match role {
                    ActorRole::Passenger => ride.passenger_id == user_id,
                    ActorRole::Rider => ride.rider_id.as_deref() == Some(user_id.as_str()),
                })
                .cloned()
                .collect();
            rides.sort_by_key(|ride| std::cmp::Reverse(ride.created_at));
            Ok(rides)
        })
    }

    fn find_profile(
        &self,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store.inner.lock().await.profiles.get(&user_id).cloned())
        })
    }

    fn save_profile(&self, profile: ProfileEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            store
                .inner
                .lock()
                .await
                .profiles
                .insert(profile.user_id.clone(), profile);
            Ok(())
        })
    }

    fn update_rider_rating(
        &self,
        user_id: String,
        expected_total: u32,
        rating: f64,
        total_ratings: u32,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let mut guard = store.inner.lock().await;
            match guard.profiles.get_mut(&user_id) {
                Some(profile) if profile.total_ratings == expected_total => {
                    profile.rating = rating;
                    profile.total_ratings = total_ratings;
                    profile.updated_at = std::time::SystemTime::now();
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn append_notification(
        &self,
        notification: NotificationEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            store
                .inner
                .lock()
                .await
                .inboxes
                .entry(notification.recipient_id.clone())
                .or_default()
                .push(notification);
            Ok(())
        })
    }

    fn list_notifications(
        &self,
        recipient_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<NotificationEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let guard = store.inner.lock().await;
            let mut inbox = guard.inboxes.get(&recipient_id).cloned().unwrap_or_default();
            inbox.reverse();
            Ok(inbox)
        })
    }

    fn mark_notification_read(
        &self,
        recipient_id: String,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let mut guard = store.inner.lock().await;
            let entry = guard
                .inboxes
                .get_mut(&recipient_id)
                .and_then(|inbox| inbox.iter_mut().find(|entry| entry.id == id));
            match entry {
                Some(entry) => {
                    entry.read = true;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn clear_notifications(&self, recipient_id: String) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let removed = store
                .inner
                .lock()
                .await
                .inboxes
                .remove(&recipient_id)
                .map_or(0, |inbox| inbox.len() as u64);
            Ok(removed)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_online().map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::LocationEntity;

    fn ride() -> RideEntity {
        RideEntity::new_request(
            "p1".into(),
            LocationEntity::labelled("Accra Mall"),
            LocationEntity::labelled("Circle"),
            None,
            None,
        )
    }

    fn claim(rider: &str) -> RidePatch {
        let mut patch = RidePatch::at(SystemTime::now());
        patch.status = Some(RideStatus::Accepted);
        patch.rider_id = Some(rider.into());
        patch
    }

    #[tokio::test]
    async fn conditional_update_rejects_stale_status() {
        let store = MemoryRideStore::new();
        let ride = ride();
        store.insert_ride(ride.clone()).await.unwrap();

        let first = store
            .update_ride(ride.id, claim("r1"), Some(RideStatus::Pending))
            .await
            .unwrap();
        let second = store
            .update_ride(ride.id, claim("r2"), Some(RideStatus::Pending))
            .await
            .unwrap();

        assert!(matches!(first, UpdateOutcome::Applied(ref r) if r.rider_id.as_deref() == Some("r1")));
        assert_eq!(
            second,
            UpdateOutcome::StatusMismatch {
                actual: RideStatus::Accepted
            }
        );
        let stored = store.find_ride(ride.id).await.unwrap().unwrap();
        assert_eq!(stored.rider_id.as_deref(), Some("r1"));
        assert_eq!(stored.revision, 2);
    }

    #[tokio::test]
    async fn update_of_unknown_ride_reports_not_found() {
        let store = MemoryRideStore::new();
        let outcome = store
            .update_ride(Uuid::new_v4(), claim("r1"), None)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::NotFound);
    }

    #[tokio::test]
    async fn offline_store_fails_without_writing() {
        let store = MemoryRideStore::new();
        let ride = ride();
        store.insert_ride(ride.clone()).await.unwrap();
        store.set_offline(true);
        assert!(store
            .update_ride(ride.id, claim("r1"), Some(RideStatus::Pending))
            .await
            .is_err());
        store.set_offline(false);
        let stored = store.find_ride(ride.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RideStatus::Pending);
    }

    #[tokio::test]
    async fn rating_cas_requires_matching_total() {
        let store = MemoryRideStore::new();
        let profile = ProfileEntity::new("r1".into(), ActorRole::Rider, "Kojo".into());
        store.save_profile(profile).await.unwrap();

        assert!(store.update_rider_rating("r1".into(), 0, 4.0, 1).await.unwrap());
        assert!(!store.update_rider_rating("r1".into(), 0, 5.0, 1).await.unwrap());
        let stored = store.find_profile("r1".into()).await.unwrap().unwrap();
        assert_eq!(stored.total_ratings, 1);
        assert_eq!(stored.rating, 4.0);
    }

    #[tokio::test]
    async fn inbox_lists_newest_first_and_clears() {
        let store = MemoryRideStore::new();
        for title in ["first", "second"] {
            store
                .append_notification(NotificationEntity::new(
                    "p1".into(),
                    crate::dao::models::NotificationKind::RideAccepted,
                    title.into(),
                    String::new(),
                    None,
                ))
                .await
                .unwrap();
        }
        let inbox = store.list_notifications("p1".into()).await.unwrap();
        assert_eq!(inbox[0].title, "second");
        assert!(store
            .mark_notification_read("p1".into(), inbox[1].id)
            .await
            .unwrap());
        assert!(!store
            .mark_notification_read("someone-else".into(), inbox[1].id)
            .await
            .unwrap());
        assert_eq!(store.clear_notifications("p1".into()).await.unwrap(), 2);
        assert!(store.list_notifications("p1".into()).await.unwrap().is_empty());
    }
}
