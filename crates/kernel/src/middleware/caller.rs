//! Caller identity middleware.
//!
//! The fronting proxy authenticates requests and forwards the identity in
//! headers:
//! - `X-Forwarded-User`: calling user
//! - `X-Forwarded-Service`: calling service
//! - `X-Forwarded-Capabilities`: comma-separated user capabilities
//!
//! The resulting [`Caller`] is stored in the request extensions. Requests
//! without these headers get an anonymous caller, which no access check
//! lets through.

use axum::{body::Body, http::HeaderMap, http::Request, middleware::Next, response::Response};

use crate::access::Caller;

pub const USER_HEADER: &str = "x-forwarded-user";
pub const SERVICE_HEADER: &str = "x-forwarded-service";
pub const CAPABILITIES_HEADER: &str = "x-forwarded-capabilities";

/// Middleware that resolves the [`Caller`] for every request.
pub async fn resolve_caller(mut request: Request<Body>, next: Next) -> Response {
    let caller = caller_from_headers(request.headers());
    tracing::trace!(caller = %caller.principal(), "resolved caller");
    request.extensions_mut().insert(caller);
    next.run(request).await
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Build a caller from forwarded identity headers.
pub fn caller_from_headers(headers: &HeaderMap) -> Caller {
    let user = header(headers, USER_HEADER).map(str::to_string);
    let service = header(headers, SERVICE_HEADER).map(str::to_string);
    let capabilities = match (&user, header(headers, CAPABILITIES_HEADER)) {
        (Some(_), Some(list)) => list
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
        _ => Default::default(),
    };
    Caller {
        user,
        service,
        capabilities,
    }
}
