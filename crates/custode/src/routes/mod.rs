//! First-party endpoint plumbing: path matching, origin resolution, and
//! CORS.
//!
//! Endpoints are configured as absolute paths or full URLs; dispatch
//! matches on the path component, and metadata resolves paths back into
//! fully-qualified URLs against the request's origin.

pub mod metadata;
pub mod register;
pub mod token;

use axum::http::{HeaderValue, header};
use axum::response::Response;

use crate::handler::Request;

/// Well-known path for authorization server metadata (RFC 8414).
pub const METADATA_PATH: &str = "/.well-known/oauth-authorization-server";

/// The path component of a configured endpoint (which may be a full URL).
pub(crate) fn endpoint_path(endpoint: &str) -> &str {
    for scheme in ["https://", "http://"] {
        if let Some(rest) = endpoint.strip_prefix(scheme) {
            return match rest.find('/') {
                Some(idx) => &rest[idx..],
                None => "/",
            };
        }
    }
    endpoint
}

/// Exact-path match against a configured endpoint.
pub(crate) fn path_matches(endpoint: &str, path: &str) -> bool {
    endpoint_path(endpoint) == path
}

/// Prefix match against a configured API route.
pub(crate) fn prefix_matches(route: &str, path: &str) -> bool {
    path.starts_with(endpoint_path(route))
}

/// The request's origin, for resolving configured endpoint paths.
///
/// Prefers the absolute-form request URI; otherwise reconstructs from
/// `X-Forwarded-Proto` (default `https`) and `Host`.
pub(crate) fn request_origin(req: &Request) -> String {
    let uri = req.uri();
    if let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) {
        return format!("{scheme}://{authority}");
    }

    let proto = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{proto}://{host}")
}

/// A configured endpoint as a fully-qualified URL.
pub(crate) fn resolve_endpoint(origin: &str, endpoint: &str) -> String {
    if endpoint.starts_with('/') {
        format!("{origin}{endpoint}")
    } else {
        endpoint.to_string()
    }
}

/// Add the CORS response headers to a first-party response. The request's
/// `Origin` is echoed back verbatim.
pub(crate) fn apply_cors(mut resp: Response, origin: &HeaderValue) -> Response {
    let headers = resp.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, *"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    resp
}
