use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{OnboardingStatus, ProfileEntity, VehicleEntity},
    dto::format_system_time,
    state::session::ActorRole,
};

/// Vehicle descriptor.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VehicleDto {
    pub model: String,
    pub plate_number: String,
    pub color: String,
}

impl From<VehicleEntity> for VehicleDto {
    fn from(value: VehicleEntity) -> Self {
        Self {
            model: value.model,
            plate_number: value.plate_number,
            color: value.color,
        }
    }
}

/// Vehicle fields a rider may set on their profile.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct VehicleInput {
    #[validate(length(min = 1, max = 80))]
    pub model: String,
    #[validate(length(min = 1, max = 20))]
    pub plate_number: String,
    #[validate(length(min = 1, max = 40))]
    pub color: String,
}

impl From<VehicleInput> for VehicleEntity {
    fn from(value: VehicleInput) -> Self {
        Self {
            model: value.model.trim().to_owned(),
            plate_number: value.plate_number.trim().to_owned(),
            color: value.color.trim().to_owned(),
        }
    }
}

/// Profile as returned to clients.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileView {
    pub user_id: String,
    pub role: ActorRole,
    pub name: String,
    pub phone: Option<String>,
    pub profile_pic: Option<String>,
    pub vehicle: Option<VehicleDto>,
    pub rating: f64,
    pub total_ratings: u32,
    pub onboarding_status: OnboardingStatus,
    pub has_push_token: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ProfileEntity> for ProfileView {
    fn from(value: ProfileEntity) -> Self {
        Self {
            user_id: value.user_id,
            role: value.role,
            name: value.name,
            phone: value.phone,
            profile_pic: value.profile_pic,
            vehicle: value.vehicle.map(Into::into),
            rating: value.rating,
            total_ratings: value.total_ratings,
            onboarding_status: value.onboarding_status,
            has_push_token: value.push_token.is_some(),
            created_at: format_system_time(value.created_at),
            updated_at: format_system_time(value.updated_at),
        }
    }
}

/// Display fields a user may set on their own profile.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpsertProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    /// URL of an already uploaded picture.
    #[serde(default)]
    #[validate(url)]
    pub profile_pic: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub vehicle: Option<VehicleInput>,
}

/// Device push token registration; `null` unregisters.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PushTokenRequest {
    #[validate(length(min = 1, max = 256))]
    pub token: Option<String>,
}

/// Onboarding status change.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct OnboardingRequest {
    pub status: OnboardingStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_name_is_rejected() {
        let request = UpsertProfileRequest {
            name: String::new(),
            phone: None,
            profile_pic: None,
            vehicle: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn nested_vehicle_is_validated() {
        let request: UpsertProfileRequest = serde_json::from_str(
            r#"{"name": "Kojo", "vehicle": {"model": "Corolla", "plate_number": "", "color": "red"}}"#,
        )
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn view_hides_push_token_value() {
        let mut profile = ProfileEntity::new("r1".into(), ActorRole::Rider, "Kojo".into());
        profile.push_token = Some("ExponentPushToken[abc]".into());
        let json = serde_json::to_value(ProfileView::from(profile)).unwrap();
        assert_eq!(json["has_push_token"], true);
        assert!(json.get("push_token").is_none());
        assert_eq!(json["onboarding_status"], "incomplete");
    }
}
