use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::{lifecycle::RideStatus, session::ActorRole};

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CoordinatesEntity {
    pub lat: f64,
    pub lng: f64,
}

/// Pickup or dropoff point of a ride.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationEntity {
    /// Free-text label shown to both parties (e.g. "Accra Mall").
    pub label: String,
    /// Absent when the client only supplied a label.
    pub coordinates: Option<CoordinatesEntity>,
}

impl LocationEntity {
    /// Location known only by its label.
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            coordinates: None,
        }
    }
}

/// Vehicle descriptor from a rider profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VehicleEntity {
    pub model: String,
    pub plate_number: String,
    pub color: String,
}

/// Copy of the claiming rider's profile, taken at accept time and never refreshed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiderInfoEntity {
    pub name: String,
    pub phone: Option<String>,
    pub profile_pic: Option<String>,
    pub rating: f64,
    pub total_ratings: u32,
    pub vehicle: VehicleEntity,
}

impl From<&ProfileEntity> for RiderInfoEntity {
    fn from(profile: &ProfileEntity) -> Self {
        Self {
            name: profile.name.clone(),
            phone: profile.phone.clone(),
            profile_pic: profile.profile_pic.clone(),
            rating: profile.rating,
            total_ratings: profile.total_ratings,
            vehicle: profile.vehicle.clone().unwrap_or_default(),
        }
    }
}

/// Ride record shared by the passenger and the claiming rider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RideEntity {
    /// Primary key, assigned at creation.
    pub id: Uuid,
    /// Incremented by the store on every write.
    pub revision: u64,
    pub status: RideStatus,
    pub passenger_id: String,
    /// Set once by the winning claim, `None` while pending.
    pub rider_id: Option<String>,
    pub pickup: LocationEntity,
    pub dropoff: LocationEntity,
    pub rider_info: Option<RiderInfoEntity>,
    pub fare: Option<f64>,
    /// Minutes, when supplied by the client.
    pub estimated_duration: Option<f64>,
    pub cancelled_by: Option<ActorRole>,
    pub cancellation_reason: Option<String>,
    pub passenger_rating: Option<u8>,
    pub passenger_feedback: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub accepted_at: Option<SystemTime>,
    pub picked_up_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub cancelled_at: Option<SystemTime>,
    pub rated_at: Option<SystemTime>,
}

impl RideEntity {
    /// Fresh pending ride for `passenger_id`.
    pub fn new_request(
        passenger_id: String,
        pickup: LocationEntity,
        dropoff: LocationEntity,
        fare: Option<f64>,
        estimated_duration: Option<f64>,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            revision: 1,
            status: RideStatus::Pending,
            passenger_id,
            rider_id: None,
            pickup,
            dropoff,
            rider_info: None,
            fare,
            estimated_duration,
            cancelled_by: None,
            cancellation_reason: None,
            passenger_rating: None,
            passenger_feedback: None,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            picked_up_at: None,
            completed_at: None,
            cancelled_at: None,
            rated_at: None,
        }
    }

    /// Whether `user_id` is the passenger or the bound rider of this ride.
    pub fn involves(&self, user_id: &str) -> bool {
        self.passenger_id == user_id || self.rider_id.as_deref() == Some(user_id)
    }
}

/// Fields written together by one lifecycle transition.
///
/// Only `Some` fields are written. Audit fields that already hold a value are
/// never overwritten.
#[derive(Debug, Clone, PartialEq)]
pub struct RidePatch {
    pub updated_at: SystemTime,
    pub status: Option<RideStatus>,
    pub rider_id: Option<String>,
    pub rider_info: Option<RiderInfoEntity>,
    pub cancelled_by: Option<ActorRole>,
    pub cancellation_reason: Option<String>,
    pub passenger_rating: Option<u8>,
    pub passenger_feedback: Option<String>,
    pub accepted_at: Option<SystemTime>,
    pub picked_up_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub cancelled_at: Option<SystemTime>,
    pub rated_at: Option<SystemTime>,
}

impl RidePatch {
    /// Empty patch stamped with `updated_at`.
    pub fn at(updated_at: SystemTime) -> Self {
        Self {
            updated_at,
            status: None,
            rider_id: None,
            rider_info: None,
            cancelled_by: None,
            cancellation_reason: None,
            passenger_rating: None,
            passenger_feedback: None,
            accepted_at: None,
            picked_up_at: None,
            completed_at: None,
            cancelled_at: None,
            rated_at: None,
        }
    }

    /// Apply the patch to an in-memory copy and bump its revision.
    pub fn apply_to(&self, ride: &mut RideEntity) {
        if let Some(status) = self.status {
            ride.status = status;
        }
        fill(&mut ride.rider_id, &self.rider_id);
        fill(&mut ride.rider_info, &self.rider_info);
        fill(&mut ride.cancelled_by, &self.cancelled_by);
        fill(&mut ride.cancellation_reason, &self.cancellation_reason);
        fill(&mut ride.passenger_rating, &self.passenger_rating);
        fill(&mut ride.passenger_feedback, &self.passenger_feedback);
        fill(&mut ride.accepted_at, &self.accepted_at);
        fill(&mut ride.picked_up_at, &self.picked_up_at);
        fill(&mut ride.completed_at, &self.completed_at);
        fill(&mut ride.cancelled_at, &self.cancelled_at);
        fill(&mut ride.rated_at, &self.rated_at);
        ride.updated_at = self.updated_at;
        ride.revision += 1;
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

/// Rider onboarding gate: only approved riders may go online.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    /// Passengers skip onboarding.
    NotRequired,
    Incomplete,
    /// Documents submitted, awaiting review.
    Pending,
    Approved,
}

impl OnboardingStatus {
    /// Onboarding only moves forward.
    pub fn can_advance_to(self, next: OnboardingStatus) -> bool {
        matches!(
            (self, next),
            (OnboardingStatus::Incomplete, OnboardingStatus::Pending)
                | (OnboardingStatus::Pending, OnboardingStatus::Approved)
                | (OnboardingStatus::Incomplete, OnboardingStatus::Approved)
        )
    }
}

/// User profile, owned by the profile screens and read by the lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileEntity {
    pub user_id: String,
    pub role: ActorRole,
    pub name: String,
    pub phone: Option<String>,
    pub profile_pic: Option<String>,
    pub vehicle: Option<VehicleEntity>,
    /// Running mean of every rating received.
    pub rating: f64,
    pub total_ratings: u32,
    pub onboarding_status: OnboardingStatus,
    pub push_token: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl ProfileEntity {
    /// New profile with no ratings; riders start onboarding as incomplete.
    pub fn new(user_id: String, role: ActorRole, name: String) -> Self {
        let now = SystemTime::now();
        Self {
            user_id,
            role,
            name,
            phone: None,
            profile_pic: None,
            vehicle: None,
            rating: 0.0,
            total_ratings: 0,
            onboarding_status: match role {
                ActorRole::Passenger => OnboardingStatus::NotRequired,
                ActorRole::Rider => OnboardingStatus::Incomplete,
            },
            push_token: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Kind of inbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RideAccepted,
    RidePickedUp,
    RideCompleted,
    RideCancelled,
    NewRating,
}

/// Append-only inbox record; only `read` ever changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationEntity {
    pub id: Uuid,
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub ride_id: Option<Uuid>,
    pub read: bool,
    pub created_at: SystemTime,
}

impl NotificationEntity {
    /// Unread entry created now.
    pub fn new(
        recipient_id: String,
        kind: NotificationKind,
        title: String,
        body: String,
        ride_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            kind,
            title,
            body,
            ride_id,
            read: false,
            created_at: SystemTime::now(),
        }
    }
}
