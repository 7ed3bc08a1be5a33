use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::ride::RideView,
    state::{lifecycle::RideStatus, reactions::Reaction},
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream (`ride`, `pending` or `inbox`).
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Emitted on a ride stream when its status changes for the first time to a new value.
pub struct RideReactionEvent {
    pub ride_id: Uuid,
    /// `None` on the first delivery of the stream.
    pub previous: Option<RideStatus>,
    pub status: RideStatus,
    /// What the subscribing app should do, in order.
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Full set of claimable rides, oldest first.
pub struct PendingRidesEvent {
    pub rides: Vec<RideView>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}
