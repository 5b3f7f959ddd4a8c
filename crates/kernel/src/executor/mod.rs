//! Transactional executors.
//!
//! An executor (transacter) owns the connection and transaction handling for
//! a set of entities. The dispatcher only forwards configured queries to it.
//!
//! Implementations:
//! - [`PgTransacter`]: PostgreSQL via sqlx, SQL generated with SeaQuery
//! - [`MemoryTransacter`]: rows held in memory, for tests and demos

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryTransacter;
pub use postgres::PgTransacter;

use crate::query::ConfiguredQuery;

/// A result row, with one value per selected path.
pub type Row = Vec<serde_json::Value>;

/// A registered database entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityType {
    /// Entity name as used by the dashboard (`Movie`).
    pub name: String,

    /// Backing SQL table.
    pub table: String,

    /// Declared members, in display order.
    #[serde(default)]
    pub members: Vec<EntityMember>,
}

/// A single entity member and its backing column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityMember {
    /// Member (path) name.
    pub name: String,

    /// Column name, when it differs from the member name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl EntityMember {
    /// Create a member backed by a column of the same name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: None,
        }
    }

    /// Create a member backed by a differently named column.
    pub fn with_column(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: Some(column.into()),
        }
    }

    /// The backing column name.
    pub fn column(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

impl EntityType {
    /// Create an entity with the given members (columns named like members).
    pub fn new(name: impl Into<String>, table: impl Into<String>, members: &[&str]) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            members: members.iter().map(|m| EntityMember::new(*m)).collect(),
        }
    }

    /// Member names, in declaration order.
    pub fn member_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.name.clone()).collect()
    }

    /// Look up a member by path.
    pub fn member(&self, path: &str) -> Option<&EntityMember> {
        self.members.iter().find(|m| m.name == path)
    }
}

/// Errors raised while executing a query.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("[dbEntity={entity}] has no member [path={path}]")]
    UnknownPath { entity: String, path: String },

    #[error("[operator={operator}] on [path={path}] requires a value")]
    MissingValue { path: String, operator: String },

    #[error("[operator={operator}] on [path={path}] cannot use value {value}")]
    InvalidValue {
        path: String,
        operator: String,
        value: String,
    },

    #[error(
        "query on [dbEntity={entity}] returned {rows} rows, more than the limit of {limit}; add constraints"
    )]
    TooManyRows {
        entity: String,
        rows: usize,
        limit: u32,
    },

    /// The database refused a submitted value (SQLSTATE class 22).
    #[error("[dbEntity={entity}] rejected a query value: {message}")]
    RejectedValue { entity: String, message: String },

    #[error("[dbEntity={0}] is not managed by this transacter")]
    UnmanagedEntity(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl ExecError {
    /// Whether the error was caused by the request rather than the backend.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ExecError::Database(_))
    }
}

/// Executor owning transaction scope for a set of entities.
#[async_trait]
pub trait Transacter: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Entities this executor manages.
    fn entities(&self) -> &[EntityType];

    /// Run the configured query inside a single transaction and return one
    /// row per match, projected onto `paths`.
    async fn select_rows(
        &self,
        query: &ConfiguredQuery,
        paths: &[String],
    ) -> Result<Vec<Row>, ExecError>;

    /// Whether the backing store is reachable.
    async fn healthy(&self) -> bool {
        true
    }

    /// Find a managed entity by name.
    fn entity(&self, name: &str) -> Option<&EntityType> {
        self.entities().iter().find(|e| e.name == name)
    }
}

/// Expand an IN/NOT_IN value: arrays as-is, strings split on commas.
pub(crate) fn value_list(value: &serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items.clone(),
        serde_json::Value::String(s) => s
            .split(',')
            .map(|part| serde_json::Value::String(part.trim().to_string()))
            .collect(),
        other => vec![other.clone()],
    }
}

/// All executors registered at startup.
#[derive(Clone, Default)]
pub struct TransacterSet {
    transacters: Vec<Arc<dyn Transacter>>,
}

impl TransacterSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor.
    pub fn with(mut self, transacter: Arc<dyn Transacter>) -> Self {
        self.transacters.push(transacter);
        self
    }

    /// Find the executor managing the named entity.
    pub fn for_entity(&self, entity: &str) -> Option<&Arc<dyn Transacter>> {
        self.transacters
            .iter()
            .find(|t| t.entities().iter().any(|e| e.name == entity))
    }

    /// Every registered executor.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Transacter>> {
        self.transacters.iter()
    }

    /// Number of registered executors.
    pub fn len(&self) -> usize {
        self.transacters.len()
    }

    /// Whether no executors are registered.
    pub fn is_empty(&self) -> bool {
        self.transacters.is_empty()
    }
}
