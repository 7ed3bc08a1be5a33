use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the installed store and report whether the service runs degraded.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let Ok(store) = state.require_ride_store().await else {
        warn!("storage unavailable (degraded mode)");
        return HealthResponse::degraded();
    };

    let reachable = match state.run_store_call("health_check", store.health_check()).await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "storage health check failed");
            false
        }
    };

    if state.is_degraded() {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok(reachable)
    }
}
