//! Persistent records and wire payloads.
//!
//! Storage records serialize with camelCase field names: the stored JSON
//! schema is part of the public contract of the key-value layout. Wire
//! payloads use the snake_case member names registered by the OAuth RFCs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A registered OAuth client, stored at `client:{clientId}` with no TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub client_id: String,

    /// SHA-256 hex of the client secret. Present iff the client is
    /// confidential; public clients never persist a secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Registered redirect URIs. Membership checks are whole-string
    /// equality, never prefix or pattern matching.
    pub redirect_uris: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tos_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<String>>,

    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,

    /// Unix seconds at registration.
    pub registration_date: i64,

    /// One of `client_secret_basic`, `client_secret_post`, `none`.
    pub token_endpoint_auth_method: String,
}

impl Client {
    /// A public client authenticates with no secret.
    pub fn is_public(&self) -> bool {
        self.token_endpoint_auth_method == "none"
    }

    pub fn is_confidential(&self) -> bool {
        !self.is_public()
    }

    /// Whole-string redirect URI membership check.
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }

    /// A copy safe to hand to management callers: the stored secret hash
    /// is stripped.
    pub fn redacted(&self) -> Client {
        Client {
            client_secret: None,
            ..self.clone()
        }
    }
}

/// A user's authorization of a client, stored at `grant:{userId}:{grantId}`.
///
/// Carries a TTL only while it holds an unredeemed authorization code;
/// redemption clears the code slot and persists the grant without expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub id: String,
    pub client_id: String,
    pub user_id: String,

    /// Granted scope; possibly narrower than requested.
    pub scope: Vec<String>,

    /// Application-supplied metadata, visible to management APIs.
    pub metadata: Value,

    /// base64(AES-256-GCM ciphertext) of the application props. The
    /// encryption key is never stored unwrapped.
    pub encrypted_props: String,

    /// Unix seconds.
    pub created_at: i64,

    /// SHA-256 hex of the outstanding authorization code. Present iff the
    /// code has not been redeemed; clearing it is irreversible and is the
    /// anti-replay gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_code_id: Option<String>,
    /// Props key wrapped under the authorization code string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_code_wrapped_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,

    /// Current refresh-token slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_wrapped_key: Option<String>,

    /// Previous refresh-token slot, the rotation grace window. At most
    /// two refresh tokens are ever simultaneously valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_refresh_token_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_refresh_token_wrapped_key: Option<String>,
}

/// Projection of a [`Grant`] for management listings: no encrypted data,
/// no token material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantSummary {
    pub id: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: Vec<String>,
    pub metadata: Value,
    pub created_at: i64,
}

impl From<&Grant> for GrantSummary {
    fn from(grant: &Grant) -> Self {
        Self {
            id: grant.id.clone(),
            client_id: grant.client_id.clone(),
            user_id: grant.user_id.clone(),
            scope: grant.scope.clone(),
            metadata: grant.metadata.clone(),
            created_at: grant.created_at,
        }
    }
}

/// Denormalized grant fields carried on every access-token record so API
/// validation is a single read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrantSnapshot {
    pub client_id: String,
    pub scope: Vec<String>,
    pub encrypted_props: String,
}

/// An access token, stored at `token:{userId}:{grantId}:{tokenHash}` with
/// TTL equal to the configured access-token lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    /// SHA-256 hex of the token string (same value embedded in the key).
    pub id: String,
    pub grant_id: String,
    pub user_id: String,

    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds; never more than `created_at` plus the configured TTL.
    pub expires_at: i64,

    /// Props key wrapped under the access-token string.
    pub wrapped_encryption_key: String,

    pub grant: TokenGrantSnapshot,
}

/// Token endpoint success payload (RFC 6749 §5.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn client_stored_field_names_are_camel_case() {
        let client = Client {
            client_id: "abcd1234abcd1234".to_string(),
            client_secret: Some("deadbeef".to_string()),
            redirect_uris: vec!["https://rp.example/cb".to_string()],
            client_name: Some("Test".to_string()),
            logo_uri: None,
            client_uri: None,
            policy_uri: None,
            tos_uri: None,
            jwks_uri: None,
            contacts: None,
            grant_types: vec!["authorization_code".to_string()],
            response_types: vec!["code".to_string()],
            registration_date: 1_700_000_000,
            token_endpoint_auth_method: "client_secret_basic".to_string(),
        };

        let json = serde_json::to_value(&client).unwrap();
        assert!(json.get("clientId").is_some());
        assert!(json.get("redirectUris").is_some());
        assert!(json.get("tokenEndpointAuthMethod").is_some());
        assert!(json.get("client_id").is_none());
    }

    #[test]
    fn redacted_client_drops_secret() {
        let client = Client {
            client_id: "abcd1234abcd1234".to_string(),
            client_secret: Some("deadbeef".to_string()),
            redirect_uris: vec![],
            client_name: None,
            logo_uri: None,
            client_uri: None,
            policy_uri: None,
            tos_uri: None,
            jwks_uri: None,
            contacts: None,
            grant_types: vec![],
            response_types: vec![],
            registration_date: 0,
            token_endpoint_auth_method: "client_secret_basic".to_string(),
        };
        assert!(client.redacted().client_secret.is_none());
    }

    #[test]
    fn grant_omits_empty_slots() {
        let grant = Grant {
            id: "g".to_string(),
            client_id: "c".to_string(),
            user_id: "u".to_string(),
            scope: vec![],
            metadata: serde_json::json!({}),
            encrypted_props: String::new(),
            created_at: 0,
            auth_code_id: None,
            auth_code_wrapped_key: None,
            code_challenge: None,
            code_challenge_method: None,
            refresh_token_id: None,
            refresh_token_wrapped_key: None,
            previous_refresh_token_id: None,
            previous_refresh_token_wrapped_key: None,
        };
        let json = serde_json::to_value(&grant).unwrap();
        assert!(json.get("authCodeId").is_none());
        assert!(json.get("refreshTokenId").is_none());
    }

    #[test]
    fn redirect_uri_match_is_whole_string() {
        let client = Client {
            client_id: "c".to_string(),
            client_secret: None,
            redirect_uris: vec!["https://rp.example/cb".to_string()],
            client_name: None,
            logo_uri: None,
            client_uri: None,
            policy_uri: None,
            tos_uri: None,
            jwks_uri: None,
            contacts: None,
            grant_types: vec![],
            response_types: vec![],
            registration_date: 0,
            token_endpoint_auth_method: "none".to_string(),
        };
        assert!(client.has_redirect_uri("https://rp.example/cb"));
        assert!(!client.has_redirect_uri("https://rp.example/cb/extra"));
        assert!(!client.has_redirect_uri("https://rp.example/"));
    }
}
