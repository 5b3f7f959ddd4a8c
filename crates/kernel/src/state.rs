//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::access::DashboardAccess;
use crate::catalog::{CatalogFile, QueryRegistry, install, installed};
use crate::config::Config;
use crate::db;
use crate::dispatch::QueryDispatcher;
use crate::executor::{PgTransacter, Transacter, TransacterSet};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Query dispatcher over the frozen registry and the executors.
    dispatcher: QueryDispatcher,

    /// Access required for every dashboard action.
    dashboard_access: DashboardAccess,
}

impl AppState {
    /// Load the catalog, install its registry, and connect the executors.
    ///
    /// A registry already installed in this process is reused.
    pub async fn new(config: &Config) -> Result<Self> {
        let catalog = match &config.catalog_path {
            Some(path) => CatalogFile::from_path(path)?,
            None => {
                info!("CATALOG_PATH not set; using the bundled demo catalog");
                CatalogFile::demo()?
            }
        };
        // The registry is built and installed once per process.
        let registry = match installed() {
            Some(registry) => {
                info!("reusing the installed query registry");
                registry
            }
            None => {
                let registry = Arc::new(catalog.to_registry().context("invalid query catalog")?);
                install(registry.clone()).context("failed to install query registry")?;
                registry
            }
        };

        let transacter: Arc<dyn Transacter> = match &config.database_url {
            Some(url) => {
                let pool = db::create_pool(url, config.database_max_connections).await?;
                Arc::new(
                    PgTransacter::new("postgres", pool, catalog.entities.clone())
                        .with_statement_timeout(config.statement_timeout_secs),
                )
            }
            None => {
                warn!("DATABASE_URL not set; serving catalog fixtures from memory");
                Arc::new(catalog.memory_transacter("memory"))
            }
        };
        info!(
            transacter = transacter.name(),
            entities = transacter.entities().len(),
            queries = registry.len(),
            "query catalog ready"
        );

        let dispatcher = QueryDispatcher::new(
            registry,
            TransacterSet::new().with(transacter),
            config.query_limits,
        );
        let dashboard_access = DashboardAccess::new(
            config.dashboard_capabilities.iter().cloned(),
            config.dashboard_services.iter().cloned(),
        );

        Ok(Self::from_parts(dispatcher, dashboard_access))
    }

    /// Assemble state from an already built dispatcher.
    pub fn from_parts(dispatcher: QueryDispatcher, dashboard_access: DashboardAccess) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                dispatcher,
                dashboard_access,
            }),
        }
    }

    pub fn dispatcher(&self) -> &QueryDispatcher {
        &self.inner.dispatcher
    }

    pub fn registry(&self) -> &Arc<QueryRegistry> {
        self.inner.dispatcher.registry()
    }

    pub fn dashboard_access(&self) -> &DashboardAccess {
        &self.inner.dashboard_access
    }

    /// Health of every executor, by name.
    pub async fn transacter_health(&self) -> Vec<(String, bool)> {
        let mut health = Vec::new();
        for transacter in self.inner.dispatcher.transacters().iter() {
            health.push((transacter.name().to_string(), transacter.healthy().await));
        }
        health
    }
}
