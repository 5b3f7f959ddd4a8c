//! Database query actions.
//!
//! - `POST /api/database/query/hibernate`: declared or dynamic queries,
//!   clauses keyed by parameter type name
//! - `POST /api/database/query/hibernate/dynamic`: dynamic queries only
//! - `POST /api/database/query/hibernate/static`: legacy declared queries
//! - `GET /api/database/query/metadata`: catalog entries visible to the caller

use axum::{
    Extension, Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;

use super::helpers::require_dashboard_access;
use crate::access::Caller;
use crate::catalog::QueryMetadata;
use crate::catalog::types::{
    QUERY_DYNAMIC_WEB_ACTION_PATH, QUERY_STATIC_WEB_ACTION_PATH, QUERY_WEB_ACTION_PATH,
};
use crate::dispatch::{DynamicQueryRequest, QueryRequest, QueryResponse, StaticQueryRequest};
use crate::error::AppResult;
use crate::state::AppState;

/// Path of the catalog listing.
pub const QUERY_METADATA_PATH: &str = "/api/database/query/metadata";

/// Create the query router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(QUERY_WEB_ACTION_PATH, post(run_query))
        .route(QUERY_DYNAMIC_WEB_ACTION_PATH, post(run_dynamic_query))
        .route(QUERY_STATIC_WEB_ACTION_PATH, post(run_static_query))
        .route(QUERY_METADATA_PATH, get(list_metadata))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataResponse {
    database_query_metadata: Vec<QueryMetadata>,
}

async fn run_query(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<QueryRequest>,
) -> AppResult<Json<QueryResponse>> {
    require_dashboard_access(&state, &caller)?;
    let response = state.dispatcher().execute(&caller, request).await?;
    Ok(Json(response))
}

async fn run_dynamic_query(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<DynamicQueryRequest>,
) -> AppResult<Json<QueryResponse>> {
    require_dashboard_access(&state, &caller)?;
    let response = state.dispatcher().execute_dynamic(&caller, request).await?;
    Ok(Json(response))
}

async fn run_static_query(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<StaticQueryRequest>,
) -> AppResult<Json<QueryResponse>> {
    require_dashboard_access(&state, &caller)?;
    let response = state.dispatcher().execute_static(&caller, request).await?;
    Ok(Json(response))
}

async fn list_metadata(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> AppResult<Json<MetadataResponse>> {
    require_dashboard_access(&state, &caller)?;
    let database_query_metadata = state
        .dispatcher()
        .visible_metadata(&caller)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(MetadataResponse {
        database_query_metadata,
    }))
}
