//! Token endpoint (RFC 6749 §3.2).
//!
//! Accepts `application/x-www-form-urlencoded` POSTs, authenticates the
//! client (HTTP Basic or form credentials), and dispatches on `grant_type`.
//!
//! Both grant handlers persist the mutated grant BEFORE writing the new
//! access-token record: if the token write fails, a retry sees a spent
//! code (or a rotated refresh slot) instead of a double issuance.

use std::collections::HashMap;

use axum::Json;
use axum::http::{HeaderName, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::crypto;
use crate::error::{OAuthError, ProviderResult};
use crate::handler::Request;
use crate::models::{Client, TokenResponse};
use crate::services::{ClientService, GrantService};
use crate::token::{TokenParts, token_hash};

/// Upper bound on a token-request body.
const FORM_BODY_LIMIT: usize = 1024 * 1024;

/// RFC 7636 §4.1 allows 43–128 characters; bounded with margin.
const MAX_CODE_VERIFIER_LENGTH: usize = 256;

/// Token responses must not be cached (RFC 6749 §5.1).
fn token_response_headers() -> [(HeaderName, &'static str); 2] {
    [
        (header::CACHE_CONTROL, "no-store"),
        (header::PRAGMA, "no-cache"),
    ]
}

pub(crate) async fn handle(
    clients: &ClientService,
    grants: &GrantService,
    req: Request,
) -> Response {
    match serve(clients, grants, req).await {
        Ok(resp) => resp,
        Err(e) => {
            debug!(error = %e, code = e.code(), "token request rejected");
            e.into_response()
        }
    }
}

async fn serve(
    clients: &ClientService,
    grants: &GrantService,
    req: Request,
) -> ProviderResult<Response> {
    if req.method() != Method::POST {
        return Err(OAuthError::method_not_allowed());
    }

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim() == "application/x-www-form-urlencoded")
    {
        return Err(OAuthError::invalid_request(
            "content type must be application/x-www-form-urlencoded",
        ));
    }

    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, FORM_BODY_LIMIT)
        .await
        .map_err(|_| OAuthError::payload_too_large())?;
    let form: HashMap<String, String> = url::form_urlencoded::parse(&bytes)
        .into_owned()
        .collect();

    // Client credentials: Authorization: Basic if present, else the form.
    let basic = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "));
    let (client_id, client_secret) = match basic {
        Some(encoded) => parse_basic_credentials(encoded)?,
        None => (
            form.get("client_id").cloned().unwrap_or_default(),
            form.get("client_secret").cloned(),
        ),
    };
    if client_id.is_empty() {
        return Err(OAuthError::InvalidClient("client_id is required".to_string()));
    }

    let client = clients
        .authenticate(&client_id, client_secret.as_deref())
        .await?;

    let grant_type = form.get("grant_type").map(String::as_str).unwrap_or_default();
    let response = match grant_type {
        "authorization_code" => authorization_code_grant(grants, &client, &form).await?,
        "refresh_token" => refresh_token_grant(grants, &client, &form).await?,
        _ => return Err(OAuthError::UnsupportedGrantType),
    };

    Ok((StatusCode::OK, token_response_headers(), Json(response)).into_response())
}

fn parse_basic_credentials(encoded: &str) -> ProviderResult<(String, Option<String>)> {
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| OAuthError::invalid_request("malformed Authorization header"))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| OAuthError::invalid_request("malformed Authorization header"))?;
    let (id, secret) = decoded
        .split_once(':')
        .ok_or_else(|| OAuthError::invalid_request("malformed Authorization header"))?;
    Ok((id.to_string(), Some(secret.to_string())))
}

/// RFC 6749 §4.1.3 with the PKCE checks of RFC 7636 §4.6.
async fn authorization_code_grant(
    grants: &GrantService,
    client: &Client,
    form: &HashMap<String, String>,
) -> ProviderResult<TokenResponse> {
    let code = form
        .get("code")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::invalid_request("code is required"))?;
    let parts = TokenParts::parse(code)
        .ok_or_else(|| OAuthError::InvalidGrant("malformed authorization code".to_string()))?;

    let mut grant = grants
        .get_grant(&parts.user_id, &parts.grant_id)
        .await?
        .ok_or_else(|| OAuthError::InvalidGrant("grant not found or expired".to_string()))?;

    // The anti-replay gate: the slot is cleared on first redemption.
    let code_id = grant
        .auth_code_id
        .clone()
        .ok_or_else(|| OAuthError::InvalidGrant("authorization code already used".to_string()))?;
    if !crypto::ct_eq(&token_hash(code), &code_id) {
        return Err(OAuthError::InvalidGrant(
            "authorization code does not match".to_string(),
        ));
    }
    if grant.client_id != client.client_id {
        return Err(OAuthError::InvalidGrant(
            "authorization code was issued to another client".to_string(),
        ));
    }

    let redirect_uri = form.get("redirect_uri").filter(|v| !v.is_empty());
    if grant.code_challenge.is_none() && redirect_uri.is_none() {
        return Err(OAuthError::invalid_request("redirect_uri is required"));
    }
    if let Some(uri) = redirect_uri
        && !client.has_redirect_uri(uri)
    {
        return Err(OAuthError::InvalidGrant("redirect_uri mismatch".to_string()));
    }

    if let Some(challenge) = &grant.code_challenge {
        let verifier = form
            .get("code_verifier")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("code_verifier is required"))?;
        if verifier.len() > MAX_CODE_VERIFIER_LENGTH {
            return Err(OAuthError::invalid_request("code_verifier too long"));
        }
        let method = grant.code_challenge_method.as_deref().unwrap_or("plain");
        if !crypto::verify_pkce(challenge, method, verifier) {
            return Err(OAuthError::InvalidGrant(
                "PKCE verification failed".to_string(),
            ));
        }
    }

    // The presented code is the only thing that can unwrap the props key.
    let wrapped = grant.auth_code_wrapped_key.clone().ok_or_else(|| {
        OAuthError::Internal(anyhow::anyhow!("grant is missing its code-wrapped key"))
    })?;
    let props_key = crypto::unwrap_key(code, &wrapped)?;

    let refresh_token = TokenParts::mint(&grant.user_id, &grant.id).assemble();

    grant.auth_code_id = None;
    grant.auth_code_wrapped_key = None;
    grant.code_challenge = None;
    grant.code_challenge_method = None;
    grant.refresh_token_id = Some(token_hash(&refresh_token));
    grant.refresh_token_wrapped_key = Some(crypto::wrap_key(&refresh_token, &props_key)?);
    grant.previous_refresh_token_id = None;
    grant.previous_refresh_token_wrapped_key = None;

    // Persisting without a TTL: redemption makes the grant long-lived.
    grants.save_grant(&grant, None).await?;

    let issued = grants.mint_access_token(&grant, &props_key).await?;
    debug!(grant_id = %grant.id, client_id = %client.client_id, "authorization code redeemed");

    Ok(TokenResponse {
        access_token: issued.token,
        token_type: "bearer".to_string(),
        expires_in: issued.expires_in,
        refresh_token: Some(refresh_token),
        scope: grant.scope.join(" "),
    })
}

/// RFC 6749 §6 with a one-step rotation grace window: the presented token
/// always becomes the previous slot, so a client that lost the response
/// can retry the same refresh once, and the token before that dies.
async fn refresh_token_grant(
    grants: &GrantService,
    client: &Client,
    form: &HashMap<String, String>,
) -> ProviderResult<TokenResponse> {
    let presented = form
        .get("refresh_token")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::invalid_request("refresh_token is required"))?;
    let parts = TokenParts::parse(presented)
        .ok_or_else(|| OAuthError::InvalidGrant("malformed refresh token".to_string()))?;

    let mut grant = grants
        .get_grant(&parts.user_id, &parts.grant_id)
        .await?
        .ok_or_else(|| OAuthError::InvalidGrant("grant not found".to_string()))?;

    let presented_hash = token_hash(presented);
    let matches_current = grant
        .refresh_token_id
        .as_deref()
        .is_some_and(|id| crypto::ct_eq(id, &presented_hash));
    let matches_previous = grant
        .previous_refresh_token_id
        .as_deref()
        .is_some_and(|id| crypto::ct_eq(id, &presented_hash));

    let wrapped = if matches_current {
        grant.refresh_token_wrapped_key.clone()
    } else if matches_previous {
        grant.previous_refresh_token_wrapped_key.clone()
    } else {
        return Err(OAuthError::InvalidGrant(
            "refresh token is not valid for this grant".to_string(),
        ));
    }
    .ok_or_else(|| {
        OAuthError::Internal(anyhow::anyhow!("refresh slot is missing its wrapped key"))
    })?;

    if grant.client_id != client.client_id {
        return Err(OAuthError::InvalidGrant(
            "refresh token was issued to another client".to_string(),
        ));
    }

    let props_key = crypto::unwrap_key(presented, &wrapped)?;

    let new_refresh = TokenParts::mint(&grant.user_id, &grant.id).assemble();

    // Unconditional rotation: presented → previous, fresh → current.
    grant.previous_refresh_token_id = Some(presented_hash);
    grant.previous_refresh_token_wrapped_key = Some(wrapped);
    grant.refresh_token_id = Some(token_hash(&new_refresh));
    grant.refresh_token_wrapped_key = Some(crypto::wrap_key(&new_refresh, &props_key)?);

    grants.save_grant(&grant, None).await?;

    let issued = grants.mint_access_token(&grant, &props_key).await?;
    debug!(grant_id = %grant.id, client_id = %client.client_id, "refresh token rotated");

    Ok(TokenResponse {
        access_token: issued.token,
        token_type: "bearer".to_string(),
        expires_in: issued.expires_in,
        refresh_token: Some(new_refresh),
        scope: grant.scope.join(" "),
    })
}
