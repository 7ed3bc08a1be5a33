use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::ride::{
        AdvanceStatusRequest, CancelRideRequest, ClaimRejection, CreateRideRequest,
        RatingResponse, RideView, SubmitRatingRequest,
    },
    error::AppError,
    services::ride_service::{self, ClaimOutcome},
    state::{SharedState, session::Session},
};

/// Ride lifecycle endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rides", post(create_ride))
        .route("/rides/history", get(ride_history))
        .route("/rides/{id}", get(get_ride))
        .route("/rides/{id}/claim", post(claim_ride))
        .route("/rides/{id}/status", post(advance_status))
        .route("/rides/{id}/cancel", post(cancel_ride))
        .route("/rides/{id}/rating", post(submit_rating))
}

/// Request a ride as the calling passenger.
#[utoipa::path(
    post,
    path = "/rides",
    tag = "rides",
    request_body = CreateRideRequest,
    responses(
        (status = 201, description = "Ride requested", body = RideView),
        (status = 400, description = "Invalid pickup or dropoff"),
        (status = 403, description = "Caller is not a passenger")
    )
)]
pub async fn create_ride(
    State(state): State<SharedState>,
    session: Session,
    Valid(Json(payload)): Valid<Json<CreateRideRequest>>,
) -> Result<(StatusCode, Json<RideView>), AppError> {
    let ride = ride_service::create_ride(&state, &session, payload).await?;
    Ok((StatusCode::CREATED, Json(ride)))
}

/// Rides of the caller in their current role, newest first.
#[utoipa::path(
    get,
    path = "/rides/history",
    tag = "rides",
    responses((status = 200, description = "Ride history", body = [RideView]))
)]
pub async fn ride_history(
    State(state): State<SharedState>,
    session: Session,
) -> Result<Json<Vec<RideView>>, AppError> {
    Ok(Json(ride_service::ride_history(&state, &session).await?))
}

#[utoipa::path(
    get,
    path = "/rides/{id}",
    tag = "rides",
    params(("id" = Uuid, Path, description = "Ride identifier")),
    responses(
        (status = 200, description = "Current ride document", body = RideView),
        (status = 404, description = "Unknown ride")
    )
)]
pub async fn get_ride(
    State(state): State<SharedState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<RideView>, AppError> {
    Ok(Json(ride_service::get_ride(&state, &session, id).await?))
}

/// Claim a pending ride; exactly one concurrent claim wins.
#[utoipa::path(
    post,
    path = "/rides/{id}/claim",
    tag = "rides",
    params(("id" = Uuid, Path, description = "Ride identifier")),
    responses(
        (status = 200, description = "Ride claimed by the caller", body = RideView),
        (status = 409, description = "Another rider claimed the ride first", body = ClaimRejection)
    )
)]
pub async fn claim_ride(
    State(state): State<SharedState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let response = match ride_service::claim_ride(&state, &session, id).await? {
        ClaimOutcome::Claimed(ride) => Json(ride).into_response(),
        ClaimOutcome::AlreadyTaken { status } => (
            StatusCode::CONFLICT,
            Json(ClaimRejection {
                message: "this ride was already taken".into(),
                status,
            }),
        )
            .into_response(),
    };
    Ok(response)
}

/// Move the ride to the requested status.
#[utoipa::path(
    post,
    path = "/rides/{id}/status",
    tag = "rides",
    params(("id" = Uuid, Path, description = "Ride identifier")),
    request_body = AdvanceStatusRequest,
    responses(
        (status = 200, description = "Transition applied", body = RideView),
        (status = 409, description = "No transition from the current status")
    )
)]
pub async fn advance_status(
    State(state): State<SharedState>,
    session: Session,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<AdvanceStatusRequest>>,
) -> Result<Json<RideView>, AppError> {
    let ride = ride_service::advance_status(&state, &session, id, payload.status).await?;
    Ok(Json(ride))
}

#[utoipa::path(
    post,
    path = "/rides/{id}/cancel",
    tag = "rides",
    params(("id" = Uuid, Path, description = "Ride identifier")),
    request_body = CancelRideRequest,
    responses(
        (status = 200, description = "Ride cancelled", body = RideView),
        (status = 409, description = "Ride already finished")
    )
)]
pub async fn cancel_ride(
    State(state): State<SharedState>,
    session: Session,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<CancelRideRequest>>,
) -> Result<Json<RideView>, AppError> {
    let ride = ride_service::cancel_ride(&state, &session, id, payload.reason).await?;
    Ok(Json(ride))
}

/// Rate the rider of a completed ride.
#[utoipa::path(
    post,
    path = "/rides/{id}/rating",
    tag = "rides",
    params(("id" = Uuid, Path, description = "Ride identifier")),
    request_body = SubmitRatingRequest,
    responses(
        (status = 200, description = "Rating recorded", body = RatingResponse),
        (status = 409, description = "Ride is not completed")
    )
)]
pub async fn submit_rating(
    State(state): State<SharedState>,
    session: Session,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SubmitRatingRequest>>,
) -> Result<Json<RatingResponse>, AppError> {
    let response = ride_service::submit_rating(&state, &session, id, payload).await?;
    Ok(Json(response))
}
