use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    dao::models::{NotificationEntity, RideEntity},
    state::lifecycle::RideStatus,
};

/// In-process fan-out of committed writes to live subscribers.
///
/// Ride and inbox channels are created on first subscribe and dropped once
/// their last receiver is released, so idle rides hold no channel.
pub struct RideFeed {
    rides: DashMap<Uuid, broadcast::Sender<RideEntity>>,
    pending: broadcast::Sender<RideEntity>,
    inboxes: DashMap<String, broadcast::Sender<NotificationEntity>>,
    ride_capacity: usize,
    inbox_capacity: usize,
}

impl RideFeed {
    /// Build the feed with per-channel capacities.
    pub fn new(ride_capacity: usize, pending_capacity: usize, inbox_capacity: usize) -> Self {
        let (pending, _receiver) = broadcast::channel(pending_capacity);
        Self {
            rides: DashMap::new(),
            pending,
            inboxes: DashMap::new(),
            ride_capacity,
            inbox_capacity,
        }
    }

    /// Fan out a ride as stored after a write. `previous` is the status before that write.
    pub fn publish(&self, ride: &RideEntity, previous: Option<RideStatus>) {
        if let Some(sender) = self.rides.get(&ride.id) {
            let _ = sender.send(ride.clone());
        }
        if ride.status == RideStatus::Pending || previous == Some(RideStatus::Pending) {
            let _ = self.pending.send(ride.clone());
        }
    }

    /// Receive every later write to `ride_id`.
    pub fn watch_ride(&self, ride_id: Uuid) -> broadcast::Receiver<RideEntity> {
        self.rides
            .entry(ride_id)
            .or_insert_with(|| broadcast::channel(self.ride_capacity).0)
            .subscribe()
    }

    /// Drop the channel of `ride_id` if nobody listens any more.
    pub fn release_ride(&self, ride_id: Uuid) {
        self.rides
            .remove_if(&ride_id, |_, sender| sender.receiver_count() == 0);
    }

    /// Number of live receivers on `ride_id`.
    pub fn ride_watchers(&self, ride_id: Uuid) -> usize {
        self.rides
            .get(&ride_id)
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Receive every ride entering or leaving `pending`.
    pub fn watch_pending(&self) -> broadcast::Receiver<RideEntity> {
        self.pending.subscribe()
    }

    /// Receive notifications appended to `recipient_id`'s inbox.
    pub fn watch_inbox(&self, recipient_id: &str) -> broadcast::Receiver<NotificationEntity> {
        self.inboxes
            .entry(recipient_id.to_owned())
            .or_insert_with(|| broadcast::channel(self.inbox_capacity).0)
            .subscribe()
    }

    /// Drop the inbox channel of `recipient_id` if nobody listens any more.
    pub fn release_inbox(&self, recipient_id: &str) {
        self.inboxes
            .remove_if(recipient_id, |_, sender| sender.receiver_count() == 0);
    }

    /// Deliver a notification to live inbox subscribers; returns whether anyone received it.
    pub fn publish_notification(&self, notification: &NotificationEntity) -> bool {
        self.inboxes
            .get(&notification.recipient_id)
            .is_some_and(|sender| sender.send(notification.clone()).is_ok())
    }
}

#[cfg(test)]
mod tests {
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

    #[tokio::test]
    async fn ride_channel_is_dropped_with_last_watcher() {
        let feed = RideFeed::new(4, 4, 4);
        let ride = ride();
        let first = feed.watch_ride(ride.id);
        let second = feed.watch_ride(ride.id);
        assert_eq!(feed.ride_watchers(ride.id), 2);

        drop(first);
        feed.release_ride(ride.id);
        assert_eq!(feed.ride_watchers(ride.id), 1);

        drop(second);
        feed.release_ride(ride.id);
        assert_eq!(feed.ride_watchers(ride.id), 0);
        assert!(feed.rides.is_empty());
    }

    #[tokio::test]
    async fn pending_feed_sees_rides_leaving_pending() {
        let feed = RideFeed::new(4, 4, 4);
        let mut pending = feed.watch_pending();
        let mut ride = ride();
        feed.publish(&ride, None);
        ride.status = RideStatus::Accepted;
        feed.publish(&ride, Some(RideStatus::Pending));
        ride.status = RideStatus::PickedUp;
        feed.publish(&ride, Some(RideStatus::Accepted));

        assert_eq!(pending.recv().await.unwrap().status, RideStatus::Pending);
        assert_eq!(pending.recv().await.unwrap().status, RideStatus::Accepted);
        assert!(pending.try_recv().is_err());
    }
}
