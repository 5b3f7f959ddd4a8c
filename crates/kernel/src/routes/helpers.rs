//! Shared route helpers.

use crate::access::Caller;
use crate::error::AppError;
use crate::state::AppState;

/// Require dashboard access, or reject with 401.
pub fn require_dashboard_access(state: &AppState, caller: &Caller) -> Result<(), AppError> {
    if state.dashboard_access().permits(caller) {
        return Ok(());
    }
    tracing::debug!(caller = %caller.principal(), "dashboard access denied");
    Err(AppError::Unauthorized(
        "dashboard access requires an allowed capability or service".to_string(),
    ))
}
