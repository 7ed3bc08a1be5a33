//! Per-user inbox and the fire-and-forget dispatcher that feeds it.
//!
//! `notify` never fails: an inbox write that does not go through is logged and
//! dropped, and device push runs detached from the calling operation.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::{NotificationEntity, NotificationKind, RideEntity},
    dto::notification::{ClearResponse, NotificationView},
    error::ServiceError,
    services::push_relay::{PushData, PushMessage},
    state::{
        SharedState,
        lifecycle::RideStatus,
        session::{ActorRole, Session},
    },
};

/// Something worth telling a user about.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub ride_id: Option<Uuid>,
}

impl Notice {
    fn about(
        ride: &RideEntity,
        recipient_id: String,
        kind: NotificationKind,
        title: &str,
        body: String,
    ) -> Self {
        Self {
            recipient_id,
            kind,
            title: title.to_owned(),
            body,
            ride_id: Some(ride.id),
        }
    }
}

/// Notice for the counterparty of `actor` after `ride` reached its current status.
///
/// `None` when nobody else is bound to the ride yet, as for a pending ride the
/// passenger withdraws.
pub fn transition_notice(ride: &RideEntity, actor: ActorRole) -> Option<Notice> {
    let recipient = match actor.counterparty() {
        ActorRole::Passenger => ride.passenger_id.clone(),
        ActorRole::Rider => ride.rider_id.clone()?,
    };

    let notice = match ride.status {
        RideStatus::Accepted => {
            let name = ride
                .rider_info
                .as_ref()
                .map_or("Your rider", |info| info.name.as_str());
            Notice::about(
                ride,
                recipient,
                NotificationKind::RideAccepted,
                "Ride Accepted",
                format!("{name} is on the way!"),
            )
        }
        RideStatus::PickedUp => Notice::about(
            ride,
            recipient,
            NotificationKind::RidePickedUp,
            "Ride Started",
            "You have been picked up. Enjoy the ride!".into(),
        ),
        RideStatus::Completed => Notice::about(
            ride,
            recipient,
            NotificationKind::RideCompleted,
            "Ride Completed",
            "Thanks for riding with us!".into(),
        ),
        RideStatus::Cancelled => {
            let body = match (actor, ride.cancellation_reason.as_deref()) {
                (ActorRole::Passenger, Some(reason)) => {
                    format!("The passenger has cancelled this ride: {reason}")
                }
                (ActorRole::Passenger, None) => "The passenger has cancelled this ride.".into(),
                (ActorRole::Rider, Some(reason)) => {
                    format!("Your rider has cancelled this ride: {reason}")
                }
                (ActorRole::Rider, None) => "Your rider has cancelled this ride.".into(),
            };
            Notice::about(
                ride,
                recipient,
                NotificationKind::RideCancelled,
                "Ride Cancelled",
                body,
            )
        }
        RideStatus::Pending | RideStatus::Rated => return None,
    };
    Some(notice)
}

/// Notice telling the rider of `ride` about a new rating.
pub fn rating_notice(ride: &RideEntity, passenger_name: &str, stars: u8) -> Option<Notice> {
    let rider_id = ride.rider_id.clone()?;
    Some(Notice::about(
        ride,
        rider_id,
        NotificationKind::NewRating,
        "New Rating",
        format!("{passenger_name} rated you {stars} stars"),
    ))
}

/// Append `notice` to its recipient's inbox, alert live subscribers, then push to their device.
pub async fn notify(state: &SharedState, notice: Notice) {
    let entry = NotificationEntity::new(
        notice.recipient_id,
        notice.kind,
        notice.title,
        notice.body,
        notice.ride_id,
    );

    let store = match state.require_ride_store().await {
        Ok(store) => store,
        Err(err) => {
            warn!(recipient = %entry.recipient_id, error = %err, "dropping notification");
            return;
        }
    };
    if let Err(err) = state
        .run_store_call("append_notification", store.append_notification(entry.clone()))
        .await
    {
        warn!(recipient = %entry.recipient_id, error = %err, "failed to append notification");
        return;
    }

    if state.feed().publish_notification(&entry) {
        debug!(recipient = %entry.recipient_id, "notification delivered to live inbox");
    }

    let state = state.clone();
    tokio::spawn(async move { push_to_device(state, entry).await });
}

async fn push_to_device(state: SharedState, entry: NotificationEntity) {
    let Ok(store) = state.require_ride_store().await else {
        return;
    };
    let token = match state
        .run_store_call("find_profile", store.find_profile(entry.recipient_id.clone()))
        .await
    {
        Ok(profile) => profile.and_then(|profile| profile.push_token),
        Err(err) => {
            warn!(recipient = %entry.recipient_id, error = %err, "push skipped; profile lookup failed");
            return;
        }
    };
    let Some(token) = token else {
        debug!(recipient = %entry.recipient_id, "no push token registered");
        return;
    };

    let message = PushMessage {
        to: token,
        title: entry.title,
        body: entry.body,
        data: PushData {
            ride_id: entry.ride_id,
            notification_id: entry.id,
        },
    };
    if let Err(err) = state.push().deliver(message).await {
        warn!(recipient = %entry.recipient_id, error = %err, "push delivery failed");
    }
}

/// Inbox of the session user, newest first.
pub async fn list(state: &SharedState, session: &Session) -> Result<Vec<NotificationView>, ServiceError> {
    let store = state.require_ride_store().await?;
    let entries = state
        .run_store_call("list_notifications", store.list_notifications(session.user_id.clone()))
        .await?;
    Ok(entries.into_iter().map(Into::into).collect())
}

/// Flip the read flag of one of the session user's notifications.
pub async fn mark_read(state: &SharedState, session: &Session, id: Uuid) -> Result<(), ServiceError> {
    let store = state.require_ride_store().await?;
    let found = state
        .run_store_call(
            "mark_notification_read",
            store.mark_notification_read(session.user_id.clone(), id),
        )
        .await?;
    if found {
        Ok(())
    } else {
        Err(ServiceError::NotFound(format!("notification {id}")))
    }
}

/// Delete every notification of the session user.
pub async fn clear(state: &SharedState, session: &Session) -> Result<ClearResponse, ServiceError> {
    let store = state.require_ride_store().await?;
    let removed = state
        .run_store_call("clear_notifications", store.clear_notifications(session.user_id.clone()))
        .await?;
    debug!(user = %session.user_id, removed, "inbox cleared");
    Ok(ClearResponse { removed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::LocationEntity;

    fn ride(status: RideStatus) -> RideEntity {
        let mut ride = RideEntity::new_request(
            "p1".into(),
            LocationEntity::labelled("Accra Mall"),
            LocationEntity::labelled("Circle"),
            None,
            None,
        );
        ride.status = status;
        if status != RideStatus::Pending {
            ride.rider_id = Some("r1".into());
        }
        ride
    }

    #[test]
    fn rider_transitions_notify_the_passenger() {
        let notice = transition_notice(&ride(RideStatus::PickedUp), ActorRole::Rider).unwrap();
        assert_eq!(notice.recipient_id, "p1");
        assert_eq!(notice.kind, NotificationKind::RidePickedUp);
    }

    #[test]
    fn passenger_cancel_notifies_the_rider_with_reason() {
        let mut ride = ride(RideStatus::Cancelled);
        ride.cancellation_reason = Some("emergency".into());
        let notice = transition_notice(&ride, ActorRole::Passenger).unwrap();
        assert_eq!(notice.recipient_id, "r1");
        assert!(notice.body.ends_with("emergency"));
    }

    #[test]
    fn withdrawn_pending_ride_notifies_nobody() {
        let mut ride = ride(RideStatus::Cancelled);
        ride.rider_id = None;
        assert!(transition_notice(&ride, ActorRole::Passenger).is_none());
    }

    #[test]
    fn rating_notice_names_the_passenger() {
        let notice = rating_notice(&ride(RideStatus::Rated), "Ama", 4).unwrap();
        assert_eq!(notice.recipient_id, "r1");
        assert_eq!(notice.body, "Ama rated you 4 stars");
    }
}
