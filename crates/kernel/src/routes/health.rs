//! Health check endpoint.
//!
//! Returns 200 OK if every executor is reachable,
//! 503 Service Unavailable otherwise.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    transacters: BTreeMap<String, bool>,
    queries: usize,
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let transacters: BTreeMap<String, bool> = state.transacter_health().await.into_iter().collect();
    let healthy = transacters.values().all(|ok| *ok);

    let (status, status_code) = if healthy {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        status_code,
        Json(HealthResponse {
            status,
            transacters,
            queries: state.registry().len(),
        }),
    )
}

/// Create the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
