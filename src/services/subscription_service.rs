//! Live views over the ride feed.
//!
//! Each subscription attaches to the in-process feed before reading the store,
//! so no write committed after the read can be missed. Dropping a subscription
//! releases its feed channel exactly once.

use std::collections::HashMap;

use indexmap::IndexMap;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::{NotificationEntity, OnboardingStatus, RideEntity},
    error::ServiceError,
    services::ride_service::load_ride,
    state::{
        SharedState,
        lifecycle::RideStatus,
        session::{ActorRole, Session},
    },
};

/// Snapshots of one ride: the current document first, then one per later write.
pub struct RideSubscription {
    state: SharedState,
    ride_id: Uuid,
    viewer: String,
    initial: Option<RideEntity>,
    receiver: Option<broadcast::Receiver<RideEntity>>,
    last_revision: u64,
}

/// One delivery of a [`RideSubscription`].
#[derive(Debug)]
pub enum RideDelivery {
    /// The ride as stored after a write.
    Snapshot(RideEntity),
    /// Another rider claimed the pending ride this viewer was looking at.
    ///
    /// Carries no document; the subscription is closed once this is returned.
    Taken {
        /// Status the ride moved to.
        status: RideStatus,
    },
}

/// Attach to `ride_id` on behalf of one of its parties, or of a rider looking at a pending ride.
pub async fn subscribe_ride(
    state: &SharedState,
    session: &Session,
    ride_id: Uuid,
) -> Result<RideSubscription, ServiceError> {
    let mut subscription = RideSubscription {
        state: state.clone(),
        ride_id,
        viewer: session.user_id.clone(),
        initial: None,
        receiver: Some(state.feed().watch_ride(ride_id)),
        last_revision: 0,
    };

    let store = state.require_ride_store().await?;
    let ride = load_ride(state, &store, ride_id).await?;
    let claimable = session.role == ActorRole::Rider && ride.status == RideStatus::Pending;
    if !ride.involves(&session.user_id) && !claimable {
        return Err(ServiceError::Forbidden("not a party to this ride".into()));
    }

    debug!(%ride_id, user = %session.user_id, "ride subscription attached");
    subscription.initial = Some(ride);
    Ok(subscription)
}

impl RideSubscription {
    /// Ride this subscription follows.
    pub fn ride_id(&self) -> Uuid {
        self.ride_id
    }

    /// Next delivery newer than the last one; `None` once the feed is gone or the ride was taken.
    pub async fn next(&mut self) -> Result<Option<RideDelivery>, ServiceError> {
        let ride = match self.initial.take() {
            Some(ride) => ride,
            None => match self.recv_newer().await? {
                Some(ride) => ride,
                None => return Ok(None),
            },
        };
        Ok(Some(self.deliver(ride)))
    }

    /// Wait for a write newer than the last delivery.
    ///
    /// When the subscriber falls behind the feed, the skipped writes are
    /// replaced by a fresh read of the ride.
    async fn recv_newer(&mut self) -> Result<Option<RideEntity>, ServiceError> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Ok(None);
        };
        loop {
            match receiver.recv().await {
                Ok(ride) if ride.revision > self.last_revision => return Ok(Some(ride)),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(ride_id = %self.ride_id, skipped, "ride subscriber lagged; refetching");
                    let store = self.state.require_ride_store().await?;
                    let ride = load_ride(&self.state, &store, self.ride_id).await?;
                    if ride.revision > self.last_revision {
                        return Ok(Some(ride));
                    }
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }

    /// A ride bound to someone else is never shown to this viewer.
    fn deliver(&mut self, ride: RideEntity) -> RideDelivery {
        self.last_revision = ride.revision;
        if ride.rider_id.is_some() && !ride.involves(&self.viewer) {
            debug!(ride_id = %self.ride_id, viewer = %self.viewer, "watched ride taken by another rider");
            self.release();
            return RideDelivery::Taken {
                status: ride.status,
            };
        }
        RideDelivery::Snapshot(ride)
    }

    fn release(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            drop(receiver);
            self.state.feed().release_ride(self.ride_id);
            debug!(ride_id = %self.ride_id, "ride subscription released");
        }
    }
}

impl Drop for RideSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// The claimable set: every `pending` ride, oldest first, re-delivered whole on each change.
pub struct PendingRidesSubscription {
    state: SharedState,
    receiver: broadcast::Receiver<RideEntity>,
    rides: IndexMap<Uuid, RideEntity>,
    /// Revision at which each ride left `pending`; older pending copies are stale.
    departed: HashMap<Uuid, u64>,
    primed: bool,
}

/// Attach an approved rider to the pending-rides query ("go online").
pub async fn subscribe_pending_rides(
    state: &SharedState,
    session: &Session,
) -> Result<PendingRidesSubscription, ServiceError> {
    if session.role != ActorRole::Rider {
        return Err(ServiceError::Forbidden(
            "only riders can watch pending rides".into(),
        ));
    }

    let store = state.require_ride_store().await?;
    let approved = state
        .run_store_call("find_profile", store.find_profile(session.user_id.clone()))
        .await?
        .is_some_and(|profile| profile.onboarding_status == OnboardingStatus::Approved);
    if !approved {
        return Err(ServiceError::Forbidden(
            "rider onboarding is not approved".into(),
        ));
    }

    let receiver = state.feed().watch_pending();
    let mut subscription = PendingRidesSubscription {
        state: state.clone(),
        receiver,
        rides: IndexMap::new(),
        departed: HashMap::new(),
        primed: false,
    };
    subscription.reload().await?;
    debug!(rider = %session.user_id, pending = subscription.rides.len(), "rider went online");
    Ok(subscription)
}

impl PendingRidesSubscription {
    /// Current set on the first call, then the updated set after each change.
    pub async fn next(&mut self) -> Result<Option<Vec<RideEntity>>, ServiceError> {
        if !self.primed {
            self.primed = true;
            return Ok(Some(self.snapshot()));
        }

        loop {
            match self.receiver.recv().await {
                Ok(ride) => {
                    if self.apply(ride) {
                        return Ok(Some(self.snapshot()));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "pending subscriber lagged; reloading");
                    self.reload().await?;
                    return Ok(Some(self.snapshot()));
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }

    /// Fold one change into the set; returns whether the set changed.
    fn apply(&mut self, ride: RideEntity) -> bool {
        if ride.status != RideStatus::Pending {
            let departed = self.departed.entry(ride.id).or_default();
            *departed = (*departed).max(ride.revision);
            return self.rides.shift_remove(&ride.id).is_some();
        }
        if self.is_departed(&ride) {
            return false;
        }
        match self.rides.get(&ride.id) {
            Some(known) if known.revision >= ride.revision => false,
            _ => {
                self.rides.insert(ride.id, ride);
                self.rides
                    .sort_by(|_, left, _, right| left.created_at.cmp(&right.created_at));
                true
            }
        }
    }

    async fn reload(&mut self) -> Result<(), ServiceError> {
        let store = self.state.require_ride_store().await?;
        let rides = self
            .state
            .run_store_call(
                "list_rides_by_status",
                store.list_rides_by_status(RideStatus::Pending),
            )
            .await?;
        self.rides = rides
            .into_iter()
            .filter(|ride| !self.is_departed(ride))
            .map(|ride| (ride.id, ride))
            .collect();
        Ok(())
    }

    fn is_departed(&self, ride: &RideEntity) -> bool {
        self.departed
            .get(&ride.id)
            .is_some_and(|revision| ride.revision <= *revision)
    }

    fn snapshot(&self) -> Vec<RideEntity> {
        self.rides.values().cloned().collect()
    }
}

/// Notifications appended to the session user's inbox while attached.
pub struct InboxSubscription {
    state: SharedState,
    recipient_id: String,
    receiver: Option<broadcast::Receiver<NotificationEntity>>,
}

/// Attach to the session user's inbox.
pub fn subscribe_inbox(state: &SharedState, session: &Session) -> InboxSubscription {
    InboxSubscription {
        state: state.clone(),
        recipient_id: session.user_id.clone(),
        receiver: Some(state.feed().watch_inbox(&session.user_id)),
    }
}

impl InboxSubscription {
    /// Next notification, or `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<NotificationEntity> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(entry) => return Some(entry),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(recipient = %self.recipient_id, skipped, "inbox subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for InboxSubscription {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            drop(receiver);
            self.state.feed().release_inbox(&self.recipient_id);
        }
    }
}
