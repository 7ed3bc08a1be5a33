use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{CoordinatesEntity, LocationEntity, RideEntity, RiderInfoEntity},
    dto::{
        format_system_time,
        profile::VehicleDto,
        validation::{validate_coordinates, validate_label},
    },
    state::{lifecycle::RideStatus, session::ActorRole},
};

/// Pickup or dropoff as sent by a client.
///
/// Older clients send a bare label; it is accepted and stored without coordinates.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum LocationInput {
    /// `{ "lat": .., "lng": .., "address": .. }`.
    Structured { lat: f64, lng: f64, address: String },
    /// Plain label.
    Label(String),
}

impl LocationInput {
    fn label(&self) -> &str {
        match self {
            LocationInput::Structured { address, .. } => address,
            LocationInput::Label(label) => label,
        }
    }
}

impl Validate for LocationInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_label(self.label()) {
            errors.add("address", e);
        }

        if let LocationInput::Structured { lat, lng, .. } = self {
            if let Err(e) = validate_coordinates(*lat, *lng) {
                errors.add("coordinates", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl From<LocationInput> for LocationEntity {
    fn from(value: LocationInput) -> Self {
        match value {
            LocationInput::Structured { lat, lng, address } => LocationEntity {
                label: address.trim().to_owned(),
                coordinates: Some(CoordinatesEntity { lat, lng }),
            },
            LocationInput::Label(label) => LocationEntity::labelled(label.trim()),
        }
    }
}

/// Payload to request a new ride.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateRideRequest {
    #[validate(nested)]
    pub pickup: LocationInput,
    #[validate(nested)]
    pub dropoff: LocationInput,
    /// Quoted fare, passed through as is.
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub fare: Option<f64>,
    /// Estimated trip length in minutes, passed through as is.
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub estimated_duration: Option<f64>,
}

/// Payload to move a ride to `status`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AdvanceStatusRequest {
    pub status: RideStatus,
}

/// Payload to cancel a ride.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct CancelRideRequest {
    #[serde(default)]
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Payload of a passenger rating.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitRatingRequest {
    #[validate(range(min = 1, max = 5))]
    pub stars: u8,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub feedback: Option<String>,
}

/// Location as returned to clients.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LocationDto {
    pub address: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl From<LocationEntity> for LocationDto {
    fn from(value: LocationEntity) -> Self {
        Self {
            address: value.label,
            lat: value.coordinates.map(|c| c.lat),
            lng: value.coordinates.map(|c| c.lng),
        }
    }
}

/// Rider details copied onto the ride at accept time.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RiderInfoDto {
    pub name: String,
    pub phone: Option<String>,
    pub profile_pic: Option<String>,
    pub rating: f64,
    pub total_ratings: u32,
    pub vehicle: VehicleDto,
}

impl From<RiderInfoEntity> for RiderInfoDto {
    fn from(value: RiderInfoEntity) -> Self {
        Self {
            name: value.name,
            phone: value.phone,
            profile_pic: value.profile_pic,
            rating: value.rating,
            total_ratings: value.total_ratings,
            vehicle: value.vehicle.into(),
        }
    }
}

/// Full ride document as seen by either party.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RideView {
    pub id: Uuid,
    /// Increases with every write; later snapshots carry larger values.
    pub revision: u64,
    pub status: RideStatus,
    pub passenger_id: String,
    pub rider_id: Option<String>,
    pub pickup: LocationDto,
    pub dropoff: LocationDto,
    pub rider_info: Option<RiderInfoDto>,
    pub fare: Option<f64>,
    pub estimated_duration: Option<f64>,
    pub cancelled_by: Option<ActorRole>,
    pub cancellation_reason: Option<String>,
    pub passenger_rating: Option<u8>,
    pub passenger_feedback: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub accepted_at: Option<String>,
    pub picked_up_at: Option<String>,
    pub completed_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub rated_at: Option<String>,
}

impl From<RideEntity> for RideView {
    fn from(value: RideEntity) -> Self {
        Self {
            id: value.id,
            revision: value.revision,
            status: value.status,
            passenger_id: value.passenger_id,
            rider_id: value.rider_id,
            pickup: value.pickup.into(),
            dropoff: value.dropoff.into(),
            rider_info: value.rider_info.map(Into::into),
            fare: value.fare,
            estimated_duration: value.estimated_duration,
            cancelled_by: value.cancelled_by,
            cancellation_reason: value.cancellation_reason,
            passenger_rating: value.passenger_rating,
            passenger_feedback: value.passenger_feedback,
            created_at: format_system_time(value.created_at),
            updated_at: format_system_time(value.updated_at),
            accepted_at: value.accepted_at.map(format_system_time),
            picked_up_at: value.picked_up_at.map(format_system_time),
            completed_at: value.completed_at.map(format_system_time),
            cancelled_at: value.cancelled_at.map(format_system_time),
            rated_at: value.rated_at.map(format_system_time),
        }
    }
}

/// Body of a 409 returned to a rider who lost the claim race.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimRejection {
    pub message: String,
    /// Status the ride had moved to.
    pub status: RideStatus,
}

/// Result of a rating submission.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct RatingResponse {
    pub ride: RideView,
    /// Rider aggregate after this rating; absent if the aggregate could not be updated.
    pub rider_rating: Option<f64>,
    pub rider_total_ratings: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_string_location_becomes_label_only() {
        let input: LocationInput = serde_json::from_str(r#""  Circle ""#).unwrap();
        assert!(input.validate().is_ok());
        let entity = LocationEntity::from(input);
        assert_eq!(entity, LocationEntity::labelled("Circle"));
    }

    #[test]
    fn structured_location_keeps_coordinates() {
        let input: LocationInput =
            serde_json::from_str(r#"{"lat": 5.6, "lng": -0.18, "address": "Accra Mall"}"#).unwrap();
        let entity = LocationEntity::from(input);
        assert_eq!(entity.label, "Accra Mall");
        assert_eq!(entity.coordinates, Some(CoordinatesEntity { lat: 5.6, lng: -0.18 }));
    }

    #[test]
    fn blank_pickup_fails_validation() {
        let request: CreateRideRequest =
            serde_json::from_str(r#"{"pickup": "", "dropoff": "Circle"}"#).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn rating_outside_range_fails_validation() {
        for stars in [0, 6] {
            let request = SubmitRatingRequest {
                stars,
                feedback: None,
            };
            assert!(request.validate().is_err());
        }
    }

    #[test]
    fn view_omits_unset_fields() {
        let ride = RideEntity::new_request(
            "p1".into(),
            LocationEntity::labelled("Accra Mall"),
            LocationEntity::labelled("Circle"),
            None,
            None,
        );
        let json = serde_json::to_value(RideView::from(ride)).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("rider_id").is_none());
        assert!(json["pickup"].get("lat").is_none());
    }
}
