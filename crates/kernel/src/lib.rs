//! querydeck kernel library
//!
//! Query catalog, dispatch, executors, and the HTTP actions serving the
//! database query dashboard. The `querydeck` binary wires these together.

pub mod access;
pub mod catalog;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod middleware;
pub mod query;
pub mod routes;
pub mod state;
