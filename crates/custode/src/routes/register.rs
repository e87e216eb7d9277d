//! Dynamic client registration (RFC 7591).

use axum::Json;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::ProviderOptions;
use crate::error::{OAuthError, ProviderResult};
use crate::handler::Request;
use crate::routes::{request_origin, resolve_endpoint};
use crate::services::clients::{AUTH_METHOD_BASIC, AUTH_METHOD_NONE};
use crate::services::{ClientService, NewClient};

/// Registration bodies are capped at 1 MiB.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// RFC 7591 §2 client metadata. Typed deserialization enforces the
/// field-shape rules: string fields must be strings or absent, array
/// fields arrays of strings; unknown members are ignored.
#[derive(Debug, Default, Deserialize)]
struct RegistrationRequest {
    redirect_uris: Option<Vec<String>>,
    client_name: Option<String>,
    logo_uri: Option<String>,
    client_uri: Option<String>,
    policy_uri: Option<String>,
    tos_uri: Option<String>,
    jwks_uri: Option<String>,
    contacts: Option<Vec<String>>,
    grant_types: Option<Vec<String>>,
    response_types: Option<Vec<String>>,
    token_endpoint_auth_method: Option<String>,
}

pub(crate) async fn handle(
    clients: &ClientService,
    options: &ProviderOptions,
    req: Request,
) -> Response {
    match serve(clients, options, req).await {
        Ok(resp) => resp,
        Err(e) => {
            debug!(error = %e, code = e.code(), "registration rejected");
            e.into_response()
        }
    }
}

async fn serve(
    clients: &ClientService,
    options: &ProviderOptions,
    req: Request,
) -> ProviderResult<Response> {
    let Some(registration_endpoint) = &options.client_registration_endpoint else {
        return Err(OAuthError::NotImplemented(
            "dynamic client registration is disabled".to_string(),
        ));
    };

    if req.method() != Method::POST {
        return Err(OAuthError::method_not_allowed());
    }

    // Reject oversized payloads from the declared length up front, and
    // again from the actual read; the header is not trusted either way.
    if let Some(length) = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        && length > MAX_BODY_BYTES
    {
        return Err(OAuthError::payload_too_large());
    }

    let origin = request_origin(&req);
    let bytes = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|_| OAuthError::payload_too_large())?;

    let request: RegistrationRequest = serde_json::from_slice(&bytes)
        .map_err(|e| OAuthError::InvalidClientMetadata(format!("invalid metadata: {e}")))?;
    let metadata =
        validated_metadata(request, options.disallow_public_client_registration)?;

    let created = clients.create_client(metadata).await?;

    let mut body = ClientService::registration_response_fields(&created.client);
    body["client_id_issued_at"] = json!(created.client.registration_date);
    body["registration_client_uri"] = json!(format!(
        "{}/{}",
        resolve_endpoint(&origin, registration_endpoint),
        created.client.client_id
    ));
    if let Some(secret) = created.client_secret {
        body["client_secret"] = json!(secret);
    }

    debug!(client_id = %created.client.client_id, "client registered dynamically");
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

fn validated_metadata(
    request: RegistrationRequest,
    disallow_public: bool,
) -> ProviderResult<NewClient> {
    let redirect_uris = request
        .redirect_uris
        .filter(|uris| !uris.is_empty() && uris.iter().all(|u| !u.is_empty()))
        .ok_or_else(|| {
            OAuthError::InvalidClientMetadata(
                "at least one redirect_uris entry is required".to_string(),
            )
        })?;

    let auth_method = request
        .token_endpoint_auth_method
        .unwrap_or_else(|| AUTH_METHOD_BASIC.to_string());
    if disallow_public && auth_method == AUTH_METHOD_NONE {
        return Err(OAuthError::InvalidClientMetadata(
            "public client registration is disabled".to_string(),
        ));
    }

    Ok(NewClient {
        redirect_uris,
        client_name: request.client_name,
        logo_uri: request.logo_uri,
        client_uri: request.client_uri,
        policy_uri: request.policy_uri,
        tos_uri: request.tos_uri,
        jwks_uri: request.jwks_uri,
        contacts: request.contacts,
        grant_types: request.grant_types,
        response_types: request.response_types,
        token_endpoint_auth_method: Some(auth_method),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn parse(raw: &str) -> Result<RegistrationRequest, serde_json::Error> {
        serde_json::from_str(raw)
    }

    #[test]
    fn string_fields_must_be_strings() {
        assert!(parse(r#"{"client_name": 42}"#).is_err());
        assert!(parse(r#"{"client_name": "ok"}"#).is_ok());
        assert!(parse(r#"{}"#).is_ok());
    }

    #[test]
    fn array_fields_must_be_string_arrays() {
        assert!(parse(r#"{"redirect_uris": "https://rp.example/cb"}"#).is_err());
        assert!(parse(r#"{"redirect_uris": [1, 2]}"#).is_err());
        assert!(parse(r#"{"redirect_uris": ["https://rp.example/cb"]}"#).is_ok());
    }

    #[test]
    fn unknown_members_are_ignored() {
        assert!(parse(r#"{"redirect_uris": ["u"], "software_id": "x"}"#).is_ok());
    }

    #[test]
    fn redirect_uris_are_required() {
        let result = validated_metadata(RegistrationRequest::default(), false);
        assert!(matches!(result, Err(OAuthError::InvalidClientMetadata(_))));

        let result = validated_metadata(
            RegistrationRequest {
                redirect_uris: Some(vec![]),
                ..RegistrationRequest::default()
            },
            false,
        );
        assert!(matches!(result, Err(OAuthError::InvalidClientMetadata(_))));
    }

    #[test]
    fn defaults_applied() {
        let metadata = validated_metadata(
            RegistrationRequest {
                redirect_uris: Some(vec!["https://rp.example/cb".to_string()]),
                ..RegistrationRequest::default()
            },
            false,
        )
        .unwrap();
        assert_eq!(
            metadata.token_endpoint_auth_method.as_deref(),
            Some(AUTH_METHOD_BASIC)
        );
    }

    #[test]
    fn public_registration_can_be_disabled() {
        let request = || RegistrationRequest {
            redirect_uris: Some(vec!["https://rp.example/cb".to_string()]),
            token_endpoint_auth_method: Some(AUTH_METHOD_NONE.to_string()),
            ..RegistrationRequest::default()
        };

        assert!(validated_metadata(request(), false).is_ok());
        assert!(matches!(
            validated_metadata(request(), true),
            Err(OAuthError::InvalidClientMetadata(_))
        ));
    }
}
