mod feed;
pub mod lifecycle;
pub mod rating;
pub mod reactions;
pub mod session;

use std::{future::Future, sync::Arc};

use tokio::sync::{RwLock, watch};
use tokio::time::timeout;
use tracing::warn;

use crate::{
    config::AppConfig,
    dao::{ride_store::RideStore, storage::StorageResult},
    error::ServiceError,
    services::push_relay::PushGateway,
};

pub use self::feed::RideFeed;

pub type SharedState = Arc<AppState>;

/// Central application state: the storage handle, live feeds, and collaborators.
pub struct AppState {
    ride_store: RwLock<Option<Arc<dyn RideStore>>>,
    feed: RideFeed,
    push: Arc<dyn PushGateway>,
    config: AppConfig,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, push: Arc<dyn PushGateway>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            ride_store: RwLock::new(None),
            feed: RideFeed::new(
                config.ride_channel_capacity,
                config.pending_channel_capacity,
                config.inbox_channel_capacity,
            ),
            push,
            config,
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current ride store, if one is installed.
    pub async fn ride_store(&self) -> Option<Arc<dyn RideStore>> {
        let guard = self.ride_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current ride store, or [`ServiceError::Degraded`] while none is installed.
    pub async fn require_ride_store(&self) -> Result<Arc<dyn RideStore>, ServiceError> {
        self.ride_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new ride store implementation and leave degraded mode.
    pub async fn set_ride_store(&self, store: Arc<dyn RideStore>) {
        {
            let mut guard = self.ride_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current ride store and enter degraded mode.
    pub async fn clear_ride_store(&self) {
        {
            let mut guard = self.ride_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Fan-out hub for live ride, pending, and inbox subscribers.
    pub fn feed(&self) -> &RideFeed {
        &self.feed
    }

    /// Device push relay.
    pub fn push(&self) -> Arc<dyn PushGateway> {
        self.push.clone()
    }

    /// Runtime tunables.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Await a store call under the configured timeout.
    ///
    /// On timeout the call is abandoned and the caller sees [`ServiceError::Timeout`];
    /// nothing local is updated from its eventual result.
    pub async fn run_store_call<T, Fut>(&self, what: &'static str, call: Fut) -> Result<T, ServiceError>
    where
        Fut: Future<Output = StorageResult<T>>,
    {
        match timeout(self.config.store_timeout, call).await {
            Ok(result) => result.map_err(|err| {
                warn!(operation = what, error = %err, "store call failed");
                ServiceError::from(err)
            }),
            Err(_) => {
                warn!(
                    operation = what,
                    timeout_ms = self.config.store_timeout.as_millis(),
                    "store call timed out"
                );
                Err(ServiceError::Timeout)
            }
        }
    }
}
