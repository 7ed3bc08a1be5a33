use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::notification::{ClearResponse, NotificationView},
    error::AppError,
    services::notification_service,
    state::{SharedState, session::Session},
};

/// Inbox endpoints of the calling user.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/notifications",
            get(list_notifications).delete(clear_notifications),
        )
        .route("/notifications/{id}/read", post(mark_read))
}

/// Inbox of the caller, newest first.
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    responses((status = 200, description = "Inbox", body = [NotificationView]))
)]
pub async fn list_notifications(
    State(state): State<SharedState>,
    session: Session,
) -> Result<Json<Vec<NotificationView>>, AppError> {
    Ok(Json(notification_service::list(&state, &session).await?))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    tag = "notifications",
    params(("id" = Uuid, Path, description = "Notification identifier")),
    responses(
        (status = 204, description = "Marked as read"),
        (status = 404, description = "Not in the caller's inbox")
    )
)]
pub async fn mark_read(
    State(state): State<SharedState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    notification_service::mark_read(&state, &session, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete the whole inbox of the caller.
#[utoipa::path(
    delete,
    path = "/notifications",
    tag = "notifications",
    responses((status = 200, description = "Inbox cleared", body = ClearResponse))
)]
pub async fn clear_notifications(
    State(state): State<SharedState>,
    session: Session,
) -> Result<Json<ClearResponse>, AppError> {
    Ok(Json(notification_service::clear(&state, &session).await?))
}
