use serde::Serialize;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{NotificationEntity, NotificationKind},
    dto::format_system_time,
};

/// Inbox entry as returned to its owner.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NotificationView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub ride_id: Option<Uuid>,
    pub read: bool,
    pub created_at: String,
}

impl From<NotificationEntity> for NotificationView {
    fn from(value: NotificationEntity) -> Self {
        Self {
            id: value.id,
            kind: value.kind,
            title: value.title,
            body: value.body,
            ride_id: value.ride_id,
            read: value.read,
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Result of a bulk inbox clear.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClearResponse {
    pub removed: u64,
}
