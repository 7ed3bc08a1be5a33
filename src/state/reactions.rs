//! Client-side consequences of ride status edges.
//!
//! Both apps render from the same ride record; what each one does when the
//! status moves is decided here, away from the subscription wiring, so the
//! decision can be tested without a store or a socket.

use std::time::Duration;

use serde::Serialize;
use utoipa::ToSchema;

use crate::state::{lifecycle::RideStatus, session::ActorRole};

/// Screen a client should show next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Home,
    RiderFound,
    RideProgress,
    Rating,
    RideSummary,
}

/// One side effect a client performs on a status edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reaction {
    /// Replace the current screen.
    Navigate { screen: Screen },
    /// Same-device alert.
    Alert { title: String, body: String },
    /// Stay put long enough for the alert to be read, then move on.
    LeaveAfter { delay_ms: u64, screen: Screen },
}

impl Reaction {
    fn navigate(screen: Screen) -> Self {
        Reaction::Navigate { screen }
    }

    fn alert(title: &str, body: &str) -> Self {
        Reaction::Alert {
            title: title.to_owned(),
            body: body.to_owned(),
        }
    }

    fn leave_after(delay: Duration, screen: Screen) -> Self {
        Reaction::LeaveAfter {
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            screen,
        }
    }
}

/// Decide what a `role` client does when the ride moves from `previous` to `next`.
///
/// `previous` is `None` on the first delivery of a subscription. Returns
/// nothing when the status did not change.
pub fn reactions_for(
    role: ActorRole,
    previous: Option<RideStatus>,
    next: RideStatus,
    exit_delay: Duration,
) -> Vec<Reaction> {
    if previous == Some(next) {
        return Vec::new();
    }

    match (role, next) {
        (_, RideStatus::Pending) => Vec::new(),
        (ActorRole::Passenger, RideStatus::Accepted) => vec![
            Reaction::navigate(Screen::RiderFound),
            Reaction::alert("Driver Found", "Your driver is on the way!"),
        ],
        (ActorRole::Passenger, RideStatus::PickedUp) => {
            vec![Reaction::navigate(Screen::RideProgress)]
        }
        (ActorRole::Passenger, RideStatus::Completed) => vec![
            Reaction::navigate(Screen::Rating),
            Reaction::alert("Ride Completed", "Thanks for riding with us!"),
        ],
        (ActorRole::Passenger, RideStatus::Cancelled) => vec![
            Reaction::alert("Ride Cancelled", "Your ride has been cancelled."),
            Reaction::leave_after(exit_delay, Screen::Home),
        ],
        (ActorRole::Passenger, RideStatus::Rated) => vec![Reaction::navigate(Screen::Home)],
        // The rider app drives accepted and picked_up itself and stays on the trip screen.
        (ActorRole::Rider, RideStatus::Accepted | RideStatus::PickedUp) => {
            if previous.is_none_or(|status| status == RideStatus::Pending) {
                vec![Reaction::navigate(Screen::RideProgress)]
            } else {
                Vec::new()
            }
        }
        (ActorRole::Rider, RideStatus::Completed) => vec![Reaction::navigate(Screen::RideSummary)],
        (ActorRole::Rider, RideStatus::Cancelled) => vec![
            Reaction::alert("Ride Cancelled", "The passenger has cancelled this ride."),
            Reaction::leave_after(exit_delay, Screen::Home),
        ],
        (ActorRole::Rider, RideStatus::Rated) => Vec::new(),
    }
}

/// What a rider watching a pending ride does once another rider claims it.
pub fn claim_lost() -> Vec<Reaction> {
    vec![
        Reaction::alert("Ride Unavailable", "This ride was already taken."),
        Reaction::navigate(Screen::Home),
    ]
}

/// Remembers the last status a subscriber saw and reports only changes.
#[derive(Debug, Default, Clone)]
pub struct StatusEdgeTracker {
    last: Option<RideStatus>,
}

impl StatusEdgeTracker {
    /// Tracker that has not observed anything yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `status`; returns `(previous, status)` only when the value changed.
    pub fn observe(&mut self, status: RideStatus) -> Option<(Option<RideStatus>, RideStatus)> {
        if self.last == Some(status) {
            return None;
        }
        let previous = self.last.replace(status);
        Some((previous, status))
    }

    /// Last status observed, if any.
    pub fn last(&self) -> Option<RideStatus> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(2_500);

    #[test]
    fn repeated_snapshot_fires_once() {
        let mut tracker = StatusEdgeTracker::new();
        assert_eq!(
            tracker.observe(RideStatus::PickedUp),
            Some((None, RideStatus::PickedUp))
        );
        assert_eq!(tracker.observe(RideStatus::PickedUp), None);
        assert_eq!(
            tracker.observe(RideStatus::Completed),
            Some((Some(RideStatus::PickedUp), RideStatus::Completed))
        );
        assert_eq!(tracker.last(), Some(RideStatus::Completed));
    }

    #[test]
    fn passenger_is_told_when_driver_found() {
        let reactions = reactions_for(
            ActorRole::Passenger,
            Some(RideStatus::Pending),
            RideStatus::Accepted,
            DELAY,
        );
        assert_eq!(reactions[0], Reaction::Navigate { screen: Screen::RiderFound });
        assert!(matches!(&reactions[1], Reaction::Alert { title, .. } if title == "Driver Found"));
    }

    #[test]
    fn cancellation_leaves_after_delay_for_both_roles() {
        for role in [ActorRole::Passenger, ActorRole::Rider] {
            let reactions =
                reactions_for(role, Some(RideStatus::Accepted), RideStatus::Cancelled, DELAY);
            assert_eq!(
                reactions.last(),
                Some(&Reaction::LeaveAfter {
                    delay_ms: 2_500,
                    screen: Screen::Home
                })
            );
        }
    }

    #[test]
    fn completion_routes_each_role_differently() {
        assert_eq!(
            reactions_for(ActorRole::Passenger, Some(RideStatus::PickedUp), RideStatus::Completed, DELAY)[0],
            Reaction::Navigate { screen: Screen::Rating }
        );
        assert_eq!(
            reactions_for(ActorRole::Rider, Some(RideStatus::PickedUp), RideStatus::Completed, DELAY),
            vec![Reaction::Navigate { screen: Screen::RideSummary }]
        );
    }

    #[test]
    fn unchanged_status_has_no_reactions() {
        for role in [ActorRole::Passenger, ActorRole::Rider] {
            for status in RideStatus::ALL {
                assert!(reactions_for(role, Some(status), status, DELAY).is_empty());
            }
        }
    }

    #[test]
    fn rider_stays_on_trip_screen_through_pickup() {
        assert_eq!(
            reactions_for(ActorRole::Rider, None, RideStatus::PickedUp, DELAY),
            vec![Reaction::Navigate { screen: Screen::RideProgress }]
        );
        assert!(reactions_for(ActorRole::Rider, Some(RideStatus::Accepted), RideStatus::PickedUp, DELAY)
            .is_empty());
    }

    #[test]
    fn lost_claim_alerts_then_goes_home() {
        let reactions = claim_lost();
        assert!(matches!(&reactions[0], Reaction::Alert { body, .. } if body.contains("already taken")));
        assert_eq!(reactions[1], Reaction::Navigate { screen: Screen::Home });
    }
}
