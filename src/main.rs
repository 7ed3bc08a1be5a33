//! Ride relay binary entrypoint wiring REST, SSE and the selected storage backend.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ride_relay_back::{
    config::{AppConfig, StorageBackend},
    dao::{
        ride_store::{RideStore, memory::MemoryRideStore},
        storage::StorageError,
    },
    routes,
    services::{
        push_relay::{DisabledPushGateway, PushGateway},
        storage_supervisor,
    },
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let backend = StorageBackend::from_env().context("selecting storage backend")?;
    let push = push_gateway(&config);

    let app_state = AppState::new(config, push);
    spawn_supervisor(app_state.clone(), backend)?;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, ?backend, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the storage supervisor for the selected backend.
fn spawn_supervisor(state: SharedState, backend: StorageBackend) -> anyhow::Result<()> {
    match backend {
        StorageBackend::Memory => {
            warn!("using in-memory storage; rides are lost on restart");
            let store = MemoryRideStore::new();
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RideStore>) }
            }));
        }
        #[cfg(feature = "mongo-store")]
        StorageBackend::Mongo => {
            use ride_relay_back::dao::ride_store::mongodb::{MongoConfig, MongoRideStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await.map_err(StorageError::from)?;
                let store = MongoRideStore::connect(config)
                    .await
                    .map_err(StorageError::from)?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RideStore>)
            }));
        }
        #[cfg(feature = "couch-store")]
        StorageBackend::Couch => {
            use ride_relay_back::dao::ride_store::couchdb::{CouchConfig, CouchRideStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env().map_err(StorageError::from)?;
                let store = CouchRideStore::connect(config)
                    .await
                    .map_err(StorageError::from)?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RideStore>)
            }));
        }
        #[allow(unreachable_patterns)]
        other => anyhow::bail!("storage backend {other:?} is not compiled into this binary"),
    }
    Ok(())
}

/// Device push relay, or a gateway that drops every message when push is off.
fn push_gateway(config: &AppConfig) -> Arc<dyn PushGateway> {
    match config.push_endpoint.as_deref() {
        #[cfg(feature = "push-relay")]
        Some(endpoint) => {
            info!(endpoint, "push relay enabled");
            Arc::new(ride_relay_back::services::push_relay::ExpoPushGateway::new(
                endpoint,
            ))
        }
        _ => {
            info!("push relay disabled");
            Arc::new(DisabledPushGateway)
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
