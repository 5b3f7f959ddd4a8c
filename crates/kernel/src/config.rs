//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::query::QueryLimits;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL. When None, the catalog fixtures are
    /// served from memory.
    pub database_url: Option<String>,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Catalog YAML file. When None, the bundled demo catalog is used.
    pub catalog_path: Option<PathBuf>,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,

    /// Capabilities granting access to the dashboard actions (default: "admin").
    pub dashboard_capabilities: Vec<String>,

    /// Services granting access to the dashboard actions.
    pub dashboard_services: Vec<String>,

    /// Row limits applied to every query.
    pub query_limits: QueryLimits,

    /// Per-transaction statement timeout for PostgreSQL (default: 10).
    pub statement_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let catalog_path = env::var("CATALOG_PATH").ok().map(PathBuf::from);

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| split_list(&v))
            .unwrap_or_else(|_| vec!["*".to_string()]);

        let dashboard_capabilities = env::var("DASHBOARD_CAPABILITIES")
            .map(|v| split_list(&v))
            .unwrap_or_else(|_| vec!["admin".to_string()]);

        let dashboard_services = env::var("DASHBOARD_SERVICES")
            .map(|v| split_list(&v))
            .unwrap_or_default();

        let defaults = QueryLimits::default();
        let query_limits = QueryLimits {
            max_max_rows: env::var("QUERY_MAX_MAX_ROWS")
                .map_or(Ok(defaults.max_max_rows), |v| v.parse())
                .context("QUERY_MAX_MAX_ROWS must be a valid u32")?,
            row_count_error_limit: env::var("QUERY_ROW_COUNT_ERROR_LIMIT")
                .map_or(Ok(defaults.row_count_error_limit), |v| v.parse())
                .context("QUERY_ROW_COUNT_ERROR_LIMIT must be a valid u32")?,
            row_count_warning_limit: env::var("QUERY_ROW_COUNT_WARNING_LIMIT")
                .map_or(Ok(defaults.row_count_warning_limit), |v| v.parse())
                .context("QUERY_ROW_COUNT_WARNING_LIMIT must be a valid u32")?,
        };
        if query_limits.row_count_warning_limit > query_limits.row_count_error_limit {
            anyhow::bail!(
                "QUERY_ROW_COUNT_WARNING_LIMIT ({}) must not exceed QUERY_ROW_COUNT_ERROR_LIMIT ({})",
                query_limits.row_count_warning_limit,
                query_limits.row_count_error_limit
            );
        }

        let statement_timeout_secs = env::var("QUERY_STATEMENT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("QUERY_STATEMENT_TIMEOUT_SECS must be a valid u64")?;

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            catalog_path,
            cors_allowed_origins,
            dashboard_capabilities,
            dashboard_services,
            query_limits,
            statement_timeout_secs,
        })
    }
}

/// Split a comma-separated variable, dropping empty entries.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
