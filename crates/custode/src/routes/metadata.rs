//! Authorization server metadata (RFC 8414).

use axum::Json;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::config::ProviderOptions;
use crate::error::OAuthError;
use crate::handler::Request;
use crate::routes::{request_origin, resolve_endpoint};

pub const RESPONSE_TYPE_CODE: &str = "code";
pub const RESPONSE_TYPE_TOKEN: &str = "token";
pub const RESPONSE_MODES_SUPPORTED: [&str; 1] = ["query"];
pub const GRANT_TYPES_SUPPORTED: [&str; 2] = ["authorization_code", "refresh_token"];
pub const TOKEN_ENDPOINT_AUTH_METHODS_SUPPORTED: [&str; 3] =
    ["client_secret_basic", "client_secret_post", "none"];
pub const CODE_CHALLENGE_METHODS_SUPPORTED: [&str; 2] = ["plain", "S256"];

pub(crate) fn handle(options: &ProviderOptions, req: &Request) -> Response {
    if req.method() != Method::GET {
        return OAuthError::method_not_allowed().into_response();
    }

    let origin = request_origin(req);
    let authorization_endpoint = resolve_endpoint(&origin, &options.authorize_endpoint);
    let token_endpoint = resolve_endpoint(&origin, &options.token_endpoint);

    // The issuer is the origin of the token endpoint.
    let issuer = url::Url::parse(&token_endpoint)
        .map(|u| u.origin().ascii_serialization())
        .unwrap_or_else(|_| origin.clone());

    let mut response_types = vec![RESPONSE_TYPE_CODE];
    if options.allow_implicit_flow {
        response_types.push(RESPONSE_TYPE_TOKEN);
    }

    let mut metadata = json!({
        "issuer": issuer,
        "authorization_endpoint": authorization_endpoint,
        "token_endpoint": token_endpoint,
        "response_types_supported": response_types,
        "response_modes_supported": RESPONSE_MODES_SUPPORTED,
        "grant_types_supported": GRANT_TYPES_SUPPORTED,
        "token_endpoint_auth_methods_supported": TOKEN_ENDPOINT_AUTH_METHODS_SUPPORTED,
        "code_challenge_methods_supported": CODE_CHALLENGE_METHODS_SUPPORTED,
        "revocation_endpoint": token_endpoint,
    });

    if let Some(scopes) = &options.scopes_supported {
        metadata["scopes_supported"] = json!(scopes);
    }
    if let Some(endpoint) = &options.client_registration_endpoint {
        metadata["registration_endpoint"] = json!(resolve_endpoint(&origin, endpoint));
    }

    Json(metadata).into_response()
}
