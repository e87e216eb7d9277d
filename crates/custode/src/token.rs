//! Token string format.
//!
//! Every credential the server mints (authorization code, access token,
//! refresh token) is the string `{userId}:{grantId}:{secret}` with a
//! 32-character alphanumeric secret. The embedded ids let a receiver
//! compute the storage key in O(1) without a secondary index; the stored
//! lookup hash covers the whole string, so knowing the ids alone is
//! insufficient.

use crate::crypto;

/// Length of the random secret segment.
pub const SECRET_LENGTH: usize = 32;

/// A token string split into its three segments.
///
/// User ids must not contain `:`; `complete_authorization` enforces this
/// before any token for the user is minted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenParts {
    pub user_id: String,
    pub grant_id: String,
    pub secret: String,
}

impl TokenParts {
    /// Mint a fresh token for a user/grant pair.
    pub fn mint(user_id: &str, grant_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            grant_id: grant_id.to_string(),
            secret: crypto::random_string(SECRET_LENGTH),
        }
    }

    /// Parse a presented token string. Requires exactly three non-empty
    /// `:`-separated segments; anything else is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let segments: Vec<&str> = raw.split(':').collect();
        let [user_id, grant_id, secret] = segments.as_slice() else {
            return None;
        };
        if user_id.is_empty() || grant_id.is_empty() || secret.is_empty() {
            return None;
        }
        Some(Self {
            user_id: (*user_id).to_string(),
            grant_id: (*grant_id).to_string(),
            secret: (*secret).to_string(),
        })
    }

    /// Render the token string.
    pub fn assemble(&self) -> String {
        format!("{}:{}:{}", self.user_id, self.grant_id, self.secret)
    }
}

/// The stored lookup hash of a token string: SHA-256 hex of the entire
/// string.
pub fn token_hash(raw: &str) -> String {
    crypto::sha256_hex(raw.as_bytes())
}
