use std::{fmt, time::SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{RideEntity, RidePatch},
    state::session::ActorRole,
};

/// Lifecycle status of a ride record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    /// Requested by a passenger, waiting for a rider to claim it.
    Pending,
    /// Claimed by exactly one rider who is driving to the pickup.
    Accepted,
    /// Passenger is on board.
    PickedUp,
    /// Trip finished; the passenger may rate the rider.
    Completed,
    /// Aborted by either party. Absorbing.
    Cancelled,
    /// Completed and rated by the passenger. Absorbing.
    Rated,
}

impl RideStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [RideStatus; 6] = [
        RideStatus::Pending,
        RideStatus::Accepted,
        RideStatus::PickedUp,
        RideStatus::Completed,
        RideStatus::Cancelled,
        RideStatus::Rated,
    ];

    /// Wire representation, identical to the serde name.
    pub fn as_str(self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::Accepted => "accepted",
            RideStatus::PickedUp => "picked_up",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
            RideStatus::Rated => "rated",
        }
    }

    /// Parse the wire representation.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }

    /// No transition may leave a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, RideStatus::Cancelled | RideStatus::Rated)
    }

    /// Statuses directly reachable from this one.
    pub fn successors(self) -> &'static [RideStatus] {
        match self {
            RideStatus::Pending => &[RideStatus::Accepted, RideStatus::Cancelled],
            RideStatus::Accepted => &[RideStatus::PickedUp, RideStatus::Cancelled],
            RideStatus::PickedUp => &[RideStatus::Completed, RideStatus::Cancelled],
            RideStatus::Completed => &[RideStatus::Rated],
            RideStatus::Cancelled | RideStatus::Rated => &[],
        }
    }

    /// Whether `next` is reachable from `self` through one or more lifecycle edges.
    pub fn precedes(self, next: RideStatus) -> bool {
        self.successors()
            .iter()
            .any(|&step| step == next || step.precedes(next))
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions that drive a ride through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RideEvent {
    /// Passenger submits a new ride request.
    Request,
    /// Rider claims a pending ride (first writer wins).
    Claim,
    /// Rider reports the passenger is on board.
    PickUp,
    /// Rider finishes the trip.
    Complete,
    /// Either party aborts the ride.
    Cancel,
    /// Passenger submits a star rating.
    Rate,
}

impl RideEvent {
    /// Event whose edge ends in `target`, if any edge does.
    pub fn for_target(target: RideStatus) -> Option<Self> {
        match target {
            RideStatus::Pending => None,
            RideStatus::Accepted => Some(RideEvent::Claim),
            RideStatus::PickedUp => Some(RideEvent::PickUp),
            RideStatus::Completed => Some(RideEvent::Complete),
            RideStatus::Cancelled => Some(RideEvent::Cancel),
            RideStatus::Rated => Some(RideEvent::Rate),
        }
    }

    /// Whether `actor` may legally drive this event.
    pub fn allows(self, actor: ActorRole) -> bool {
        match self {
            RideEvent::Request | RideEvent::Rate => actor == ActorRole::Passenger,
            RideEvent::Claim | RideEvent::PickUp | RideEvent::Complete => {
                actor == ActorRole::Rider
            }
            RideEvent::Cancel => true,
        }
    }
}

/// Error returned when no lifecycle edge matches the event from the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Status the ride was in, `None` before creation.
    pub from: Option<RideStatus>,
    /// The event that has no edge from this status.
    pub event: RideEvent,
}

/// Errors that can occur when planning a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// No edge exists for the event from the current status.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// The edge exists but belongs to the other role.
    #[error("{actor} may not drive {event:?}")]
    ActorNotAllowed {
        /// Event that was attempted.
        event: RideEvent,
        /// Role that attempted it.
        actor: ActorRole,
    },
}

/// Resolve the status an event leads to from `from`, checking the actor role.
pub fn next_status(
    from: Option<RideStatus>,
    event: RideEvent,
    actor: ActorRole,
) -> Result<RideStatus, PlanError> {
    let next = match (from, event) {
        (None, RideEvent::Request) => RideStatus::Pending,
        (Some(RideStatus::Pending), RideEvent::Claim) => RideStatus::Accepted,
        (Some(RideStatus::Accepted), RideEvent::PickUp) => RideStatus::PickedUp,
        (Some(RideStatus::PickedUp), RideEvent::Complete) => RideStatus::Completed,
        (
            Some(RideStatus::Pending | RideStatus::Accepted | RideStatus::PickedUp),
            RideEvent::Cancel,
        ) => RideStatus::Cancelled,
        (Some(RideStatus::Completed), RideEvent::Rate) => RideStatus::Rated,
        (from, event) => return Err(InvalidTransition { from, event }.into()),
    };

    // A pending ride has no rider yet, so only its passenger can withdraw it.
    let allowed = match (from, event) {
        (Some(RideStatus::Pending), RideEvent::Cancel) => actor == ActorRole::Passenger,
        _ => event.allows(actor),
    };
    if !allowed {
        return Err(PlanError::ActorNotAllowed { event, actor });
    }

    Ok(next)
}

/// A validated transition that has not been written yet.
///
/// `from` doubles as the write precondition: the store only applies the
/// patch while the persisted status still equals it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    /// Ride being transitioned.
    pub ride_id: Uuid,
    /// Event that triggered the transition.
    pub event: RideEvent,
    /// Role performing the transition.
    pub actor: ActorRole,
    /// Status observed when planning.
    pub from: RideStatus,
    /// Status the ride moves to.
    pub to: RideStatus,
    /// Timestamp recorded in the audit fields.
    pub planned_at: SystemTime,
}

impl TransitionPlan {
    /// Plan `event` against the last known copy of the ride.
    pub fn new(ride: &RideEntity, event: RideEvent, actor: ActorRole) -> Result<Self, PlanError> {
        let to = next_status(Some(ride.status), event, actor)?;
        Ok(Self {
            ride_id: ride.id,
            event,
            actor,
            from: ride.status,
            to,
            planned_at: SystemTime::now(),
        })
    }

    /// Status change plus the audit fields owned by this edge.
    pub fn patch(&self) -> RidePatch {
        let at = self.planned_at;
        let mut patch = RidePatch::at(at);
        patch.status = Some(self.to);
        match self.to {
            RideStatus::Pending => {}
            RideStatus::Accepted => patch.accepted_at = Some(at),
            RideStatus::PickedUp => patch.picked_up_at = Some(at),
            RideStatus::Completed => patch.completed_at = Some(at),
            RideStatus::Cancelled => {
                patch.cancelled_at = Some(at);
                patch.cancelled_by = Some(self.actor);
            }
            RideStatus::Rated => patch.rated_at = Some(at),
        }
        patch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::dao::models::{LocationEntity, RideEntity};

    fn ride(status: RideStatus) -> RideEntity {
        let mut ride = RideEntity::new_request(
            "passenger-1".into(),
            LocationEntity::labelled("Accra Mall"),
            LocationEntity::labelled("Circle"),
            None,
            None,
        );
        ride.status = status;
        ride
    }

    const EVENTS: [RideEvent; 6] = [
        RideEvent::Request,
        RideEvent::Claim,
        RideEvent::PickUp,
        RideEvent::Complete,
        RideEvent::Cancel,
        RideEvent::Rate,
    ];
    const ROLES: [ActorRole; 2] = [ActorRole::Passenger, ActorRole::Rider];

    #[test]
    fn request_creates_pending_ride() {
        assert_eq!(
            next_status(None, RideEvent::Request, ActorRole::Passenger),
            Ok(RideStatus::Pending)
        );
        assert_eq!(
            next_status(None, RideEvent::Request, ActorRole::Rider),
            Err(PlanError::ActorNotAllowed {
                event: RideEvent::Request,
                actor: ActorRole::Rider
            })
        );
    }

    #[test]
    fn full_happy_path_through_ride() {
        let mut status = RideStatus::Pending;
        for (event, actor, expected) in [
            (RideEvent::Claim, ActorRole::Rider, RideStatus::Accepted),
            (RideEvent::PickUp, ActorRole::Rider, RideStatus::PickedUp),
            (RideEvent::Complete, ActorRole::Rider, RideStatus::Completed),
            (RideEvent::Rate, ActorRole::Passenger, RideStatus::Rated),
        ] {
            status = next_status(Some(status), event, actor).unwrap();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn cancel_is_legal_until_completion() {
        assert_eq!(
            next_status(Some(RideStatus::Pending), RideEvent::Cancel, ActorRole::Passenger),
            Ok(RideStatus::Cancelled)
        );
        assert!(matches!(
            next_status(Some(RideStatus::Pending), RideEvent::Cancel, ActorRole::Rider),
            Err(PlanError::ActorNotAllowed { .. })
        ));
        for from in [RideStatus::Accepted, RideStatus::PickedUp] {
            for actor in ROLES {
                assert_eq!(
                    next_status(Some(from), RideEvent::Cancel, actor),
                    Ok(RideStatus::Cancelled),
                    "{actor} cancelling from {from}"
                );
            }
        }
        assert!(next_status(Some(RideStatus::Completed), RideEvent::Cancel, ActorRole::Passenger).is_err());
    }

    #[test]
    fn terminal_statuses_reject_every_event() {
        for from in [RideStatus::Cancelled, RideStatus::Rated] {
            assert!(from.is_terminal());
            for event in EVENTS {
                for actor in ROLES {
                    let err = next_status(Some(from), event, actor).unwrap_err();
                    assert!(
                        matches!(err, PlanError::InvalidTransition(InvalidTransition { from: Some(f), .. }) if f == from),
                        "unexpected {err:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn every_legal_edge_moves_forward() {
        for from in RideStatus::ALL {
            for event in EVENTS {
                for actor in ROLES {
                    if let Ok(to) = next_status(Some(from), event, actor) {
                        assert!(from.successors().contains(&to));
                        assert!(from.precedes(to));
                        assert!(!to.precedes(from), "{to} loops back to {from}");
                    }
                }
            }
        }
    }

    #[test]
    fn rider_cannot_rate_and_passenger_cannot_drive() {
        assert!(matches!(
            next_status(Some(RideStatus::Completed), RideEvent::Rate, ActorRole::Rider),
            Err(PlanError::ActorNotAllowed { .. })
        ));
        assert!(matches!(
            next_status(Some(RideStatus::Pending), RideEvent::Claim, ActorRole::Passenger),
            Err(PlanError::ActorNotAllowed { .. })
        ));
        assert!(matches!(
            next_status(Some(RideStatus::Accepted), RideEvent::PickUp, ActorRole::Passenger),
            Err(PlanError::ActorNotAllowed { .. })
        ));
    }

    #[test]
    fn plan_patch_carries_edge_audit_fields() {
        let plan = TransitionPlan::new(&ride(RideStatus::PickedUp), RideEvent::Cancel, ActorRole::Passenger)
            .unwrap();
        assert_eq!(plan.from, RideStatus::PickedUp);
        let patch = plan.patch();
        assert_eq!(patch.status, Some(RideStatus::Cancelled));
        assert_eq!(patch.cancelled_by, Some(ActorRole::Passenger));
        assert_eq!(patch.cancelled_at, Some(plan.planned_at));
        assert!(patch.picked_up_at.is_none());

        let plan = TransitionPlan::new(&ride(RideStatus::Accepted), RideEvent::PickUp, ActorRole::Rider)
            .unwrap();
        assert_eq!(plan.patch().picked_up_at, Some(plan.planned_at));
    }

    #[test]
    fn target_maps_back_to_event() {
        assert_eq!(RideEvent::for_target(RideStatus::Pending), None);
        for status in RideStatus::ALL.into_iter().skip(1) {
            let event = RideEvent::for_target(status).unwrap();
            assert!(RideStatus::ALL
                .into_iter()
                .any(|from| ROLES
                    .into_iter()
                    .any(|actor| next_status(Some(from), event, actor) == Ok(status))));
        }
    }

    #[test]
    fn status_round_trips_through_wire_name() {
        for status in RideStatus::ALL {
            assert_eq!(RideStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RideStatus::parse("in_progress"), None);
    }
}
