use serde::Serialize;
use utoipa::ToSchema;

/// Overall service condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    /// No storage backend installed; lifecycle calls fail fast.
    Degraded,
}

/// Response of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    /// Whether the last health probe against the store succeeded.
    pub storage_reachable: bool,
}

impl HealthResponse {
    /// Healthy response; `storage_reachable` reflects the probe just made.
    pub fn ok(storage_reachable: bool) -> Self {
        Self {
            status: HealthStatus::Ok,
            storage_reachable,
        }
    }

    /// Degraded-mode response.
    pub fn degraded() -> Self {
        Self {
            status: HealthStatus::Degraded,
            storage_reachable: false,
        }
    }
}
