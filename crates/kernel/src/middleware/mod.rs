//! HTTP middleware components.

pub mod caller;

pub use caller::resolve_caller;
