//! Bearer-token gate for API routes.
//!
//! Validates `Authorization: Bearer`, loads the access-token record in a
//! single read (the record carries a denormalized grant snapshot), unwraps
//! the props key with the presented token string, and hands the decrypted
//! props to the API handler on the request context.

use serde_json::Value;
use tracing::debug;

use axum::http::{HeaderMap, header};

use crate::crypto;
use crate::error::{OAuthError, ProviderResult};
use crate::models::TokenRecord;
use crate::store::{self, KvStore};
use crate::token::{TokenParts, token_hash};

/// Validate the bearer token on an API request and return the decrypted
/// grant props.
pub(crate) async fn authenticate(store: &dyn KvStore, headers: &HeaderMap) -> ProviderResult<Value> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuthError::InvalidToken("missing bearer token".to_string()))?;

    let parts = TokenParts::parse(token)
        .ok_or_else(|| OAuthError::InvalidToken("malformed token".to_string()))?;

    let key = store::token_key(&parts.user_id, &parts.grant_id, &token_hash(token));
    let record: TokenRecord = store::get_json(store, &key)
        .await?
        .ok_or_else(|| OAuthError::InvalidToken("token not found or expired".to_string()))?;

    // The store's TTL should have collected this already; check anyway in
    // case it serves past expiry.
    if record.expires_at < chrono::Utc::now().timestamp() {
        debug!(grant_id = %record.grant_id, "token past its expiry served by store");
        return Err(OAuthError::InvalidToken("token expired".to_string()));
    }

    let props_key = crypto::unwrap_key(token, &record.wrapped_encryption_key)?;
    let props = crypto::decrypt_props(&props_key, &record.grant.encrypted_props)?;
    Ok(props)
}
