//! Query module.
//!
//! This module provides:
//! - Types: Operator, DynamicQuery, QueryLimits
//! - ConfiguredQuery: an entity-bound query collecting constraints and orders
//! - QueryFactory: builds configured queries sharing one set of row limits

mod configured;
pub mod types;

pub use configured::{ConfiguredQuery, OrderBy, Predicate, QueryFactory};
pub use types::{
    DYNAMIC_QUERY_SUFFIX, DynamicConstraint, DynamicOrder, DynamicQuery, DynamicSelect, Operator,
    QueryLimits, is_dynamic_query_class,
};
