use std::{future::Future, sync::Arc, time::Duration};

use rand::Rng;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{ride_store::RideStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the ride store, then health-check it forever, toggling degraded mode as it comes and goes.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RideStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_ride_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch_store(&state, store.as_ref()).await;

                state.clear_ride_store().await;
                warn!("exhausted storage reconnect attempts; dropping store and reconnecting");
                sleep(jittered(delay)).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(jittered(delay)).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Poll `store` until reconnecting to it fails [`MAX_RECONNECT_ATTEMPTS`] times in a row.
async fn watch_store(state: &SharedState, store: &dyn RideStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                if !reconnect(state, store).await {
                    return;
                }
                state.update_degraded(false);
                sleep(HEALTH_POLL_INTERVAL).await;
            }
        }
    }
}

async fn reconnect(state: &SharedState, store: &dyn RideStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "storage reconnect first attempt failed; entering degraded mode"
                    );
                    state.update_degraded(true);
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(jittered(reconnect_delay)).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

/// Spread retries of many instances by up to a quarter of `delay`.
fn jittered(delay: Duration) -> Duration {
    let spread = u64::try_from(delay.as_millis() / 4).unwrap_or(0);
    delay + Duration::from_millis(rand::rng().random_range(0..=spread))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig, dao::ride_store::memory::MemoryRideStore,
        services::push_relay::DisabledPushGateway, state::AppState,
    };

    #[test]
    fn jitter_stays_within_a_quarter() {
        for _ in 0..100 {
            let delay = jittered(Duration::from_millis(1_000));
            assert!(delay >= Duration::from_millis(1_000));
            assert!(delay <= Duration::from_millis(1_250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_installs_store_and_leaves_degraded_mode() {
        let state = AppState::new(AppConfig::default(), Arc::new(DisabledPushGateway));
        assert!(state.is_degraded());

        let store = MemoryRideStore::new();
        let task = tokio::spawn(run(state.clone(), move || {
            let store = store.clone();
            async move { Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RideStore>) }
        }));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!state.is_degraded());
        assert!(state.ride_store().await.is_some());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_store_enters_degraded_mode() {
        let state = AppState::new(AppConfig::default(), Arc::new(DisabledPushGateway));
        let store = MemoryRideStore::new();
        let offline_handle = store.clone();
        let task = tokio::spawn(run(state.clone(), move || {
            let store = store.clone();
            async move { Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RideStore>) }
        }));

        tokio::time::sleep(Duration::from_millis(10)).await;
        offline_handle.set_offline(true);
        tokio::time::sleep(HEALTH_POLL_INTERVAL * 2).await;
        assert!(state.is_degraded());
        task.abort();
    }
}
