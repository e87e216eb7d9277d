//! OAuth protocol error types.
//!
//! One variant per protocol error code. Every library-originated failure
//! is rendered to the client as `{"error", "error_description"}` JSON with
//! the canonical status; internal failures are logged and surfaced as an
//! opaque `server_error`.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to OAuth clients.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Malformed body or parameters (400), wrong method (405), or an
    /// oversized payload (413); the status rides on the variant.
    #[error("{description}")]
    InvalidRequest {
        status: StatusCode,
        description: String,
    },

    /// Unknown client, or missing/wrong client secret.
    #[error("{0}")]
    InvalidClient(String),

    /// Bad or expired code, bad refresh token, PKCE failure, redirect-URI
    /// mismatch, or client-id mismatch.
    #[error("{0}")]
    InvalidGrant(String),

    #[error("unsupported grant type")]
    UnsupportedGrantType,

    /// Registration metadata failed validation.
    #[error("{0}")]
    InvalidClientMetadata(String),

    /// Missing, malformed, or expired bearer token on an API request.
    #[error("{0}")]
    InvalidToken(String),

    /// Endpoint exists in the protocol but is disabled in this deployment.
    #[error("{0}")]
    NotImplemented(String),

    /// Storage or crypto failure; details are logged, not disclosed.
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl OAuthError {
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::InvalidRequest {
            status: StatusCode::BAD_REQUEST,
            description: description.into(),
        }
    }

    pub fn method_not_allowed() -> Self {
        Self::InvalidRequest {
            status: StatusCode::METHOD_NOT_ALLOWED,
            description: "method not allowed".to_string(),
        }
    }

    pub fn payload_too_large() -> Self {
        Self::InvalidRequest {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            description: "request body too large".to_string(),
        }
    }

    /// The wire error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidClientMetadata(_) => "invalid_client_metadata",
            Self::InvalidToken(_) => "invalid_token",
            Self::NotImplemented(_) => "not_implemented",
            Self::Internal(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { status, .. } => *status,
            Self::InvalidClient(_) | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidGrant(_)
            | Self::UnsupportedGrantType
            | Self::InvalidClientMetadata(_) => StatusCode::BAD_REQUEST,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            tracing::error!(error = %e, "internal error while serving OAuth request");
        }

        let description = self.to_string();
        let body = Json(json!({
            "error": self.code(),
            "error_description": description,
        }));

        match &self {
            Self::InvalidToken(_) => {
                // RFC 6750 §3 bearer challenge. Header values cannot carry
                // double quotes inside quoted strings, so strip them.
                let detail = description.replace('"', "'");
                let challenge = format!(
                    "Bearer realm=\"OAuth\", error=\"invalid_token\", error_description=\"{detail}\""
                );
                (
                    self.status(),
                    [(header::WWW_AUTHENTICATE, challenge)],
                    body,
                )
                    .into_response()
            }
            _ => (self.status(), body).into_response(),
        }
    }
}

/// Result alias for provider operations.
pub type ProviderResult<T> = Result<T, OAuthError>;
