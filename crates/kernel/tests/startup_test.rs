#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Startup wiring: state construction installs the process-wide registry.
//!
//! Kept in its own test binary so no other test installs a registry first.

use std::sync::Arc;

use querydeck_kernel::catalog;
use querydeck_kernel::config::Config;
use querydeck_kernel::query::QueryLimits;
use querydeck_kernel::state::AppState;

fn demo_config() -> Config {
    Config {
        port: 0,
        database_url: None,
        database_max_connections: 1,
        catalog_path: None,
        cors_allowed_origins: vec!["*".to_string()],
        dashboard_capabilities: vec!["admin".to_string()],
        dashboard_services: Vec::new(),
        query_limits: QueryLimits::default(),
        statement_timeout_secs: 10,
    }
}

#[tokio::test]
async fn state_installs_and_reuses_the_registry() {
    assert!(catalog::installed().is_none());

    let first = AppState::new(&demo_config()).await.unwrap();
    let installed = catalog::installed().unwrap();
    assert!(Arc::ptr_eq(first.registry(), &installed));
    assert!(installed.find("MovieQuery").is_some());

    let second = AppState::new(&demo_config()).await.unwrap();
    assert!(Arc::ptr_eq(second.registry(), &installed));
}
