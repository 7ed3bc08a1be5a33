use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    services::{sse_service, subscription_service},
    state::{SharedState, session::Session},
};

#[utoipa::path(
    get,
    path = "/sse/rides/{id}",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Ride identifier")),
    responses((status = 200, description = "Ride snapshots and reactions", content_type = "text/event-stream", body = String))
)]
/// Follow one ride until it reaches a terminal status.
pub async fn ride_stream(
    State(state): State<SharedState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = subscription_service::subscribe_ride(&state, &session, id).await?;
    info!(ride_id = %id, user = %session.user_id, "New ride SSE connection");
    Ok(sse_service::ride_stream(state, session, subscription))
}

#[utoipa::path(
    get,
    path = "/sse/rides/pending",
    tag = "sse",
    responses((status = 200, description = "Claimable rides", content_type = "text/event-stream", body = String))
)]
/// Go online: receive the full set of pending rides whenever it changes.
pub async fn pending_stream(
    State(state): State<SharedState>,
    session: Session,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = subscription_service::subscribe_pending_rides(&state, &session).await?;
    info!(rider = %session.user_id, "New pending rides SSE connection");
    Ok(sse_service::pending_stream(state, session, subscription))
}

#[utoipa::path(
    get,
    path = "/sse/inbox",
    tag = "sse",
    responses((status = 200, description = "New inbox entries", content_type = "text/event-stream", body = String))
)]
/// Receive notifications addressed to the caller as they are appended.
pub async fn inbox_stream(
    State(state): State<SharedState>,
    session: Session,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = subscription_service::subscribe_inbox(&state, &session);
    info!(user = %session.user_id, "New inbox SSE connection");
    sse_service::inbox_stream(state, session, subscription)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/rides/pending", get(pending_stream))
        .route("/sse/rides/{id}", get(ride_stream))
        .route("/sse/inbox", get(inbox_stream))
}
