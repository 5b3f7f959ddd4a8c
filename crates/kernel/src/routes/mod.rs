//! HTTP route handlers.

pub mod health;
pub mod helpers;
pub mod query;

use axum::Router;

use crate::state::AppState;

/// All routes, with caller resolution applied.
///
/// Transport layers (CORS, tracing) are added by the binary.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(query::router())
        .layer(axum::middleware::from_fn(crate::middleware::resolve_caller))
        .with_state(state)
}
