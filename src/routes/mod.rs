use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod notifications;
pub mod profiles;
pub mod rides;
pub mod session;
pub mod sse;

#[cfg(test)]
mod tests;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(rides::router())
        .merge(sse::router())
        .merge(notifications::router())
        .merge(profiles::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
