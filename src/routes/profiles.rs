use axum::{
    Json, Router,
    extract::State,
    routing::{get, post, put},
};
use axum_valid::Valid;

use crate::{
    dto::profile::{OnboardingRequest, ProfileView, PushTokenRequest, UpsertProfileRequest},
    error::AppError,
    services::profile_service,
    state::{SharedState, session::Session},
};

/// Profile endpoints of the calling user.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/profiles/me", get(get_profile).put(upsert_profile))
        .route("/profiles/me/push-token", put(set_push_token))
        .route("/profiles/me/onboarding", post(advance_onboarding))
}

#[utoipa::path(
    get,
    path = "/profiles/me",
    tag = "profiles",
    responses(
        (status = 200, description = "Caller profile", body = ProfileView),
        (status = 404, description = "No profile yet")
    )
)]
pub async fn get_profile(
    State(state): State<SharedState>,
    session: Session,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(profile_service::get_own(&state, &session).await?))
}

/// Create the caller's profile or update its display fields.
#[utoipa::path(
    put,
    path = "/profiles/me",
    tag = "profiles",
    request_body = UpsertProfileRequest,
    responses((status = 200, description = "Profile saved", body = ProfileView))
)]
pub async fn upsert_profile(
    State(state): State<SharedState>,
    session: Session,
    Valid(Json(payload)): Valid<Json<UpsertProfileRequest>>,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(
        profile_service::upsert_own(&state, &session, payload).await?,
    ))
}

#[utoipa::path(
    put,
    path = "/profiles/me/push-token",
    tag = "profiles",
    request_body = PushTokenRequest,
    responses((status = 200, description = "Push token saved", body = ProfileView))
)]
pub async fn set_push_token(
    State(state): State<SharedState>,
    session: Session,
    Valid(Json(payload)): Valid<Json<PushTokenRequest>>,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(
        profile_service::set_push_token(&state, &session, payload).await?,
    ))
}

/// Move the caller's rider onboarding forward.
#[utoipa::path(
    post,
    path = "/profiles/me/onboarding",
    tag = "profiles",
    request_body = OnboardingRequest,
    responses(
        (status = 200, description = "Onboarding advanced", body = ProfileView),
        (status = 409, description = "Onboarding cannot move backwards")
    )
)]
pub async fn advance_onboarding(
    State(state): State<SharedState>,
    session: Session,
    Valid(Json(payload)): Valid<Json<OnboardingRequest>>,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(
        profile_service::advance_onboarding(&state, &session, payload).await?,
    ))
}
