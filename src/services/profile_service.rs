use std::time::SystemTime;

use tracing::info;

use crate::{
    dao::models::{OnboardingStatus, ProfileEntity},
    dto::profile::{OnboardingRequest, ProfileView, PushTokenRequest, UpsertProfileRequest},
    error::ServiceError,
    state::{
        SharedState,
        session::{ActorRole, Session},
    },
};

/// Profile of the session user.
pub async fn get_own(state: &SharedState, session: &Session) -> Result<ProfileView, ServiceError> {
    load_own(state, session).await.map(Into::into)
}

/// Create or update the display fields of the session user's profile.
///
/// Rating aggregates and onboarding are left untouched.
pub async fn upsert_own(
    state: &SharedState,
    session: &Session,
    request: UpsertProfileRequest,
) -> Result<ProfileView, ServiceError> {
    if request.vehicle.is_some() && session.role != ActorRole::Rider {
        return Err(ServiceError::InvalidInput(
            "only riders can register a vehicle".into(),
        ));
    }

    let store = state.require_ride_store().await?;
    let existing = state
        .run_store_call("find_profile", store.find_profile(session.user_id.clone()))
        .await?;

    let mut profile = match existing {
        Some(profile) if profile.role != session.role => {
            return Err(ServiceError::Forbidden(format!(
                "profile `{}` belongs to a {}",
                profile.user_id, profile.role
            )));
        }
        Some(profile) => profile,
        None => {
            info!(user = %session.user_id, role = %session.role, "creating profile");
            ProfileEntity::new(session.user_id.clone(), session.role, String::new())
        }
    };

    profile.name = request.name.trim().to_owned();
    profile.phone = request.phone.map(|phone| phone.trim().to_owned());
    profile.profile_pic = request.profile_pic;
    if let Some(vehicle) = request.vehicle {
        profile.vehicle = Some(vehicle.into());
    }
    profile.updated_at = SystemTime::now();

    state
        .run_store_call("save_profile", store.save_profile(profile.clone()))
        .await?;
    Ok(profile.into())
}

/// Register or drop the device token used for push delivery.
pub async fn set_push_token(
    state: &SharedState,
    session: &Session,
    request: PushTokenRequest,
) -> Result<ProfileView, ServiceError> {
    let mut profile = load_own(state, session).await?;
    profile.push_token = request.token.map(|token| token.trim().to_owned());
    profile.updated_at = SystemTime::now();
    save(state, profile).await
}

/// Move the session rider's onboarding forward.
pub async fn advance_onboarding(
    state: &SharedState,
    session: &Session,
    request: OnboardingRequest,
) -> Result<ProfileView, ServiceError> {
    let mut profile = load_own(state, session).await?;
    if profile.role != ActorRole::Rider {
        return Err(ServiceError::InvalidInput(
            "onboarding only applies to riders".into(),
        ));
    }
    if !profile.onboarding_status.can_advance_to(request.status) {
        return Err(ServiceError::InvalidTransition(format!(
            "onboarding cannot move from {:?} to {:?}",
            profile.onboarding_status, request.status
        )));
    }
    if request.status == OnboardingStatus::Approved && profile.vehicle.is_none() {
        return Err(ServiceError::InvalidInput(
            "a vehicle is required before approval".into(),
        ));
    }

    info!(
        user = %profile.user_id,
        from = ?profile.onboarding_status,
        to = ?request.status,
        "onboarding advanced"
    );
    profile.onboarding_status = request.status;
    profile.updated_at = SystemTime::now();
    save(state, profile).await
}

async fn load_own(state: &SharedState, session: &Session) -> Result<ProfileEntity, ServiceError> {
    let store = state.require_ride_store().await?;
    state
        .run_store_call("find_profile", store.find_profile(session.user_id.clone()))
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("profile `{}` not found", session.user_id)))
}

async fn save(state: &SharedState, profile: ProfileEntity) -> Result<ProfileView, ServiceError> {
    let store = state.require_ride_store().await?;
    state
        .run_store_call("save_profile", store.save_profile(profile.clone()))
        .await?;
    Ok(profile.into())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::ride_store::memory::MemoryRideStore,
        dto::profile::VehicleInput,
        services::push_relay::DisabledPushGateway,
        state::AppState,
    };

    async fn setup() -> SharedState {
        let state = AppState::new(AppConfig::default(), Arc::new(DisabledPushGateway));
        state.set_ride_store(Arc::new(MemoryRideStore::new())).await;
        state
    }

    fn upsert(vehicle: Option<VehicleInput>) -> UpsertProfileRequest {
        UpsertProfileRequest {
            name: " Kojo ".into(),
            phone: None,
            profile_pic: None,
            vehicle,
        }
    }

    fn vehicle() -> VehicleInput {
        VehicleInput {
            model: "Corolla".into(),
            plate_number: "GR-1234-22".into(),
            color: "Silver".into(),
        }
    }

    #[tokio::test]
    async fn upsert_creates_then_keeps_aggregates() {
        let state = setup().await;
        let session = Session::rider("r1");
        let created = upsert_own(&state, &session, upsert(None)).await.unwrap();
        assert_eq!(created.name, "Kojo");
        assert_eq!(created.onboarding_status, OnboardingStatus::Incomplete);

        let store = state.require_ride_store().await.unwrap();
        assert!(store.update_rider_rating("r1".into(), 0, 5.0, 1).await.unwrap());

        let updated = upsert_own(&state, &session, upsert(Some(vehicle())))
            .await
            .unwrap();
        assert_eq!(updated.total_ratings, 1);
        assert!(updated.vehicle.is_some());
    }

    #[tokio::test]
    async fn passengers_cannot_register_vehicles() {
        let state = setup().await;
        let err = upsert_own(&state, &Session::passenger("p1"), upsert(Some(vehicle())))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn onboarding_moves_forward_only() {
        let state = setup().await;
        let session = Session::rider("r1");
        upsert_own(&state, &session, upsert(Some(vehicle())))
            .await
            .unwrap();

        let pending = OnboardingRequest {
            status: OnboardingStatus::Pending,
        };
        let approved = OnboardingRequest {
            status: OnboardingStatus::Approved,
        };
        advance_onboarding(&state, &session, pending).await.unwrap();
        let view = advance_onboarding(&state, &session, approved).await.unwrap();
        assert_eq!(view.onboarding_status, OnboardingStatus::Approved);

        let back = OnboardingRequest {
            status: OnboardingStatus::Pending,
        };
        let err = advance_onboarding(&state, &session, back).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn push_token_requires_a_profile() {
        let state = setup().await;
        let err = set_push_token(
            &state,
            &Session::passenger("p1"),
            PushTokenRequest {
                token: Some("tok".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
