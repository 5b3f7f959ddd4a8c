//! Query catalog.
//!
//! This module provides:
//! - Declarations: query interfaces described as data
//! - MetadataBuilder: turns declarations into dashboard metadata
//! - QueryRegistry: the frozen, startup-built catalog
//! - CatalogFile: YAML registration loaded at startup

pub mod builder;
pub mod declaration;
mod loader;
mod registry;
pub mod types;

use thiserror::Error;

pub use builder::MetadataBuilder;
pub use declaration::{MethodDeclaration, ParamType, QueryDeclaration};
pub use loader::{CatalogFile, CatalogRegistration};
pub use registry::{QueryRegistry, RegistryBuilder, install, installed};
pub use types::{
    ConstraintMetadata, Field, FormType, OrderMetadata, QueryMetadata, SelectMetadata,
};

/// Errors raised while building the catalog. All are fatal at startup.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("[query={query}] method {method} has {count} parameters; at most one is supported")]
    TooManyParameters {
        query: String,
        method: String,
        count: usize,
    },

    #[error("[query={query}] method {method} has a nested list parameter")]
    NestedList { query: String, method: String },

    #[error("[query={query}] extends unknown interface {interface}")]
    UnknownInterface { query: String, interface: String },

    #[error("[query={query}] targets {declared} but is registered for {registered}")]
    EntityMismatch {
        query: String,
        declared: String,
        registered: String,
    },

    #[error("[dbEntity={0}] is not declared")]
    UnknownEntity(String),

    #[error("[query={0}] is not declared")]
    UnknownQuery(String),

    #[error("[queryClass={0}] is registered more than once")]
    DuplicateQueryClass(String),

    #[error("[query={query}] declares parameter type {name} more than once")]
    DuplicateParameterType { query: String, name: String },

    #[error("query registry is already installed")]
    AlreadyInstalled,
}
