//! Grant management: authorization requests, grant issuance, listing, and
//! revocation.
//!
//! `complete_authorization` is the single place a props-encryption key is
//! born. The key is wrapped under every credential that may later need to
//! decrypt the props (authorization code, refresh tokens, access tokens)
//! and is never written to storage unwrapped.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::AUTH_CODE_TTL;
use crate::crypto::{self, KeyBytes};
use crate::error::{OAuthError, ProviderResult};
use crate::handler::Request;
use crate::models::{Grant, GrantSummary, TokenGrantSnapshot, TokenRecord};
use crate::store::{self, KvStore};
use crate::token::{TokenParts, token_hash};

/// Length of generated grant identifiers.
pub const GRANT_ID_LENGTH: usize = 16;

/// Maximum accepted length for a scope string, to bound memory use.
const MAX_SCOPE_LENGTH: usize = 1000;

/// A parsed authorization request.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// `code` or, when the implicit flow is enabled, `token`.
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    /// Requested scope, space-split with empties dropped.
    pub scope: Vec<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    /// `plain` unless the request said otherwise.
    pub code_challenge_method: String,
}

/// Input to [`GrantService::complete_authorization`], assembled by the
/// embedder's consent flow.
#[derive(Debug, Clone)]
pub struct AuthorizationInput {
    pub request: AuthRequest,
    pub user_id: String,
    /// Granted scope; possibly narrower than the request's.
    pub scope: Vec<String>,
    /// Application metadata, visible in grant listings.
    pub metadata: Value,
    /// Application state encrypted into the grant; recoverable only while
    /// a live token exists.
    pub props: Value,
}

/// Outcome of a completed authorization.
#[derive(Debug, Clone)]
pub struct CompletedAuthorization {
    /// Where to send the user agent.
    pub redirect_to: String,
    pub grant_id: String,
}

/// One page of a user's grant listing.
#[derive(Debug, Clone)]
pub struct GrantPage {
    pub grants: Vec<GrantSummary>,
    pub cursor: Option<String>,
}

/// Minted access token plus its advertised lifetime.
#[derive(Debug, Clone)]
pub(crate) struct IssuedToken {
    pub token: String,
    pub expires_in: u64,
}

/// Grant operations over the key-value store.
#[derive(Clone)]
pub struct GrantService {
    store: Arc<dyn KvStore>,
    access_token_ttl: u64,
    allow_implicit_flow: bool,
}

impl GrantService {
    pub(crate) fn new(
        store: Arc<dyn KvStore>,
        access_token_ttl: u64,
        allow_implicit_flow: bool,
    ) -> Self {
        Self {
            store,
            access_token_ttl,
            allow_implicit_flow,
        }
    }

    /// Extract an [`AuthRequest`] from an authorization-endpoint request's
    /// query string.
    pub fn parse_auth_request(&self, req: &Request) -> ProviderResult<AuthRequest> {
        let query = req.uri().query().unwrap_or_default();
        let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        let response_type = params
            .get("response_type")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("response_type is required"))?
            .clone();
        match response_type.as_str() {
            "code" => {}
            "token" if self.allow_implicit_flow => {}
            "token" => {
                return Err(OAuthError::invalid_request(
                    "the implicit flow is not enabled",
                ));
            }
            other => {
                return Err(OAuthError::invalid_request(format!(
                    "unsupported response_type {other:?}"
                )));
            }
        }

        let client_id = params
            .get("client_id")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("client_id is required"))?
            .clone();
        let redirect_uri = params
            .get("redirect_uri")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("redirect_uri is required"))?
            .clone();

        let raw_scope = params.get("scope").map(String::as_str).unwrap_or_default();
        if !validate_scope(raw_scope) {
            return Err(OAuthError::invalid_request("invalid scope"));
        }
        let scope = split_scope(raw_scope);

        let code_challenge = params.get("code_challenge").cloned().filter(|v| !v.is_empty());
        let code_challenge_method = params
            .get("code_challenge_method")
            .cloned()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "plain".to_string());
        if code_challenge.is_some() && !matches!(code_challenge_method.as_str(), "plain" | "S256")
        {
            return Err(OAuthError::invalid_request(format!(
                "unsupported code_challenge_method {code_challenge_method:?}"
            )));
        }
        if code_challenge.is_none() && params.contains_key("code_challenge_method") {
            return Err(OAuthError::invalid_request(
                "code_challenge_method requires code_challenge",
            ));
        }

        Ok(AuthRequest {
            response_type,
            client_id,
            redirect_uri,
            scope,
            state: params.get("state").cloned().filter(|v| !v.is_empty()),
            code_challenge,
            code_challenge_method,
        })
    }

    /// Record the user's approval and produce the redirect back to the
    /// client.
    ///
    /// Code flow: persists the grant with an unredeemed-code slot and a
    /// 10-minute TTL, and redirects with `code` (and `state`) in the query.
    /// Implicit flow: persists the grant without a code slot or TTL, mints
    /// an access token immediately, and carries the token response in the
    /// URL fragment.
    pub async fn complete_authorization(
        &self,
        input: AuthorizationInput,
    ) -> ProviderResult<CompletedAuthorization> {
        if input.user_id.is_empty() || input.user_id.contains(':') {
            return Err(OAuthError::invalid_request(
                "user id must be non-empty and must not contain ':'",
            ));
        }

        let grant_id = crypto::random_string(GRANT_ID_LENGTH);
        let props_key = crypto::random_key();
        let encrypted_props = crypto::encrypt_props(&props_key, &input.props)?;
        let request = input.request;

        let mut grant = Grant {
            id: grant_id.clone(),
            client_id: request.client_id.clone(),
            user_id: input.user_id.clone(),
            scope: input.scope.clone(),
            metadata: input.metadata,
            encrypted_props,
            created_at: chrono::Utc::now().timestamp(),
            auth_code_id: None,
            auth_code_wrapped_key: None,
            code_challenge: None,
            code_challenge_method: None,
            refresh_token_id: None,
            refresh_token_wrapped_key: None,
            previous_refresh_token_id: None,
            previous_refresh_token_wrapped_key: None,
        };

        let redirect_to = match request.response_type.as_str() {
            "code" => {
                let code = TokenParts::mint(&input.user_id, &grant_id).assemble();
                grant.auth_code_id = Some(token_hash(&code));
                grant.auth_code_wrapped_key = Some(crypto::wrap_key(&code, &props_key)?);
                grant.code_challenge = request.code_challenge.clone();
                grant.code_challenge_method = request
                    .code_challenge
                    .is_some()
                    .then(|| request.code_challenge_method.clone());

                self.save_grant(&grant, Some(AUTH_CODE_TTL)).await?;
                debug!(grant_id = %grant_id, client_id = %request.client_id, "authorization code issued");

                let mut params = vec![("code", code)];
                if let Some(state) = &request.state {
                    params.push(("state", state.clone()));
                }
                append_query(&request.redirect_uri, &params)
            }
            "token" => {
                if !self.allow_implicit_flow {
                    return Err(OAuthError::invalid_request(
                        "the implicit flow is not enabled",
                    ));
                }

                self.save_grant(&grant, None).await?;
                let issued = self.mint_access_token(&grant, &props_key).await?;
                debug!(grant_id = %grant_id, client_id = %request.client_id, "implicit access token issued");

                let mut params = vec![
                    ("access_token", issued.token),
                    ("token_type", "bearer".to_string()),
                    ("expires_in", issued.expires_in.to_string()),
                    ("scope", input.scope.join(" ")),
                ];
                if let Some(state) = &request.state {
                    params.push(("state", state.clone()));
                }
                append_fragment(&request.redirect_uri, &params)
            }
            other => {
                return Err(OAuthError::invalid_request(format!(
                    "unsupported response_type {other:?}"
                )));
            }
        };

        Ok(CompletedAuthorization {
            redirect_to,
            grant_id,
        })
    }

    /// Page through a user's grants as summaries: no encrypted data, no
    /// token material.
    pub async fn list_user_grants(
        &self,
        user_id: &str,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> ProviderResult<GrantPage> {
        let page = self
            .store
            .list(&store::grant_prefix(user_id), limit, cursor)
            .await?;

        let mut grants = Vec::with_capacity(page.keys.len());
        for key in &page.keys {
            if let Some(grant) = store::get_json::<Grant>(self.store.as_ref(), key).await? {
                grants.push(GrantSummary::from(&grant));
            }
        }

        Ok(GrantPage {
            grants,
            cursor: page.cursor,
        })
    }

    /// Revoke a grant: delete every access token issued under it, then the
    /// grant itself. The token listing is drained to completion; a token
    /// issued concurrently may survive until its own TTL, which is
    /// accepted.
    pub async fn revoke_grant(&self, user_id: &str, grant_id: &str) -> ProviderResult<()> {
        let prefix = store::token_prefix(user_id, grant_id);
        let mut cursor: Option<String> = None;
        loop {
            let page = self.store.list(&prefix, None, cursor.as_deref()).await?;
            for key in &page.keys {
                self.store.delete(key).await?;
            }
            if page.complete {
                break;
            }
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => {
                    warn!(grant_id = %grant_id, "token listing reported incomplete without a cursor");
                    break;
                }
            }
        }

        self.store
            .delete(&store::grant_key(user_id, grant_id))
            .await?;
        debug!(grant_id = %grant_id, user_id = %user_id, "grant revoked");
        Ok(())
    }

    pub(crate) async fn get_grant(
        &self,
        user_id: &str,
        grant_id: &str,
    ) -> ProviderResult<Option<Grant>> {
        Ok(store::get_json(self.store.as_ref(), &store::grant_key(user_id, grant_id)).await?)
    }

    pub(crate) async fn save_grant(&self, grant: &Grant, ttl_secs: Option<u64>) -> ProviderResult<()> {
        store::put_json(
            self.store.as_ref(),
            &store::grant_key(&grant.user_id, &grant.id),
            grant,
            ttl_secs,
        )
        .await?;
        Ok(())
    }

    /// Mint an access token for a grant: wrap the props key under the new
    /// token string and write the token record (with its denormalized
    /// grant snapshot) under the configured TTL.
    pub(crate) async fn mint_access_token(
        &self,
        grant: &Grant,
        props_key: &KeyBytes,
    ) -> ProviderResult<IssuedToken> {
        let token = TokenParts::mint(&grant.user_id, &grant.id).assemble();
        let hash = token_hash(&token);
        let now = chrono::Utc::now().timestamp();

        let record = TokenRecord {
            id: hash.clone(),
            grant_id: grant.id.clone(),
            user_id: grant.user_id.clone(),
            created_at: now,
            expires_at: now + self.access_token_ttl as i64,
            wrapped_encryption_key: crypto::wrap_key(&token, props_key)?,
            grant: TokenGrantSnapshot {
                client_id: grant.client_id.clone(),
                scope: grant.scope.clone(),
                encrypted_props: grant.encrypted_props.clone(),
            },
        };

        store::put_json(
            self.store.as_ref(),
            &store::token_key(&grant.user_id, &grant.id, &hash),
            &record,
            Some(self.access_token_ttl),
        )
        .await?;

        Ok(IssuedToken {
            token,
            expires_in: self.access_token_ttl,
        })
    }
}

/// Scope strings are bounded and restricted to the characters RFC 6749
/// §3.3 allows: printable ASCII except `"` and `\`, space-separated.
fn validate_scope(scope: &str) -> bool {
    if scope.is_empty() {
        return true;
    }
    if scope.len() > MAX_SCOPE_LENGTH {
        return false;
    }
    scope
        .bytes()
        .all(|b| b == 0x20 || b == 0x21 || (0x23..=0x5B).contains(&b) || (0x5D..=0x7E).contains(&b))
}

fn split_scope(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Append query parameters to a redirect URI, percent-encoding values and
/// stripping CR/LF so the result is safe in a `Location` header.
fn append_query(redirect_uri: &str, params: &[(&str, String)]) -> String {
    let mut out = redirect_uri.to_string();
    let mut separator = if redirect_uri.contains('?') { '&' } else { '?' };
    for (name, value) in params {
        out.push(separator);
        out.push_str(name);
        out.push('=');
        out.push_str(&urlencoding::encode(value));
        separator = '&';
    }
    sanitize_redirect(&out)
}

/// Append fragment parameters to a redirect URI (implicit flow).
fn append_fragment(redirect_uri: &str, params: &[(&str, String)]) -> String {
    let mut out = redirect_uri.to_string();
    let mut separator = '#';
    for (name, value) in params {
        out.push(separator);
        out.push_str(name);
        out.push('=');
        out.push_str(&urlencoding::encode(value));
        separator = '&';
    }
    sanitize_redirect(&out)
}

fn sanitize_redirect(redirect: &str) -> String {
    redirect.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::store::MemoryStore;
    use axum::body::Body;

    fn service(allow_implicit: bool) -> GrantService {
        GrantService::new(Arc::new(MemoryStore::new()), 3600, allow_implicit)
    }

    fn authorize_request(query: &str) -> Request {
        Request::builder()
            .method("GET")
            .uri(format!("https://as.example/oauth/authorize?{query}"))
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn parse_extracts_fields() {
        let req = authorize_request(
            "response_type=code&client_id=abc&redirect_uri=https%3A%2F%2Frp.example%2Fcb\
             &scope=read+write&state=xyz&code_challenge=ch&code_challenge_method=S256",
        );
        let parsed = service(false).parse_auth_request(&req).unwrap();

        assert_eq!(parsed.response_type, "code");
        assert_eq!(parsed.client_id, "abc");
        assert_eq!(parsed.redirect_uri, "https://rp.example/cb");
        assert_eq!(parsed.scope, vec!["read", "write"]);
        assert_eq!(parsed.state.as_deref(), Some("xyz"));
        assert_eq!(parsed.code_challenge.as_deref(), Some("ch"));
        assert_eq!(parsed.code_challenge_method, "S256");
    }

    #[test]
    fn parse_defaults_challenge_method_to_plain() {
        let req = authorize_request(
            "response_type=code&client_id=abc&redirect_uri=https%3A%2F%2Frp.example%2Fcb\
             &code_challenge=ch",
        );
        let parsed = service(false).parse_auth_request(&req).unwrap();
        assert_eq!(parsed.code_challenge_method, "plain");
    }

    #[test]
    fn parse_drops_empty_scope_entries() {
        let req = authorize_request(
            "response_type=code&client_id=abc&redirect_uri=https%3A%2F%2Frp.example%2Fcb\
             &scope=read++write+",
        );
        let parsed = service(false).parse_auth_request(&req).unwrap();
        assert_eq!(parsed.scope, vec!["read", "write"]);
    }

    #[test]
    fn parse_rejects_implicit_when_disabled() {
        let req = authorize_request(
            "response_type=token&client_id=abc&redirect_uri=https%3A%2F%2Frp.example%2Fcb",
        );
        assert!(service(false).parse_auth_request(&req).is_err());
        assert!(service(true).parse_auth_request(&req).is_ok());
    }

    #[test]
    fn parse_rejects_missing_fields() {
        let service = service(false);
        assert!(
            service
                .parse_auth_request(&authorize_request("client_id=abc"))
                .is_err()
        );
        assert!(
            service
                .parse_auth_request(&authorize_request("response_type=code"))
                .is_err()
        );
        assert!(
            service
                .parse_auth_request(&authorize_request(
                    "response_type=code&client_id=abc"
                ))
                .is_err()
        );
    }

    #[test]
    fn scope_validation() {
        assert!(validate_scope(""));
        assert!(validate_scope("read write"));
        assert!(!validate_scope("sco\"pe"));
        assert!(!validate_scope("sco\\pe"));
        assert!(!validate_scope(&"a".repeat(MAX_SCOPE_LENGTH + 1)));
        assert!(validate_scope(&"a".repeat(MAX_SCOPE_LENGTH)));
    }

    #[test]
    fn redirect_building() {
        let url = append_query(
            "https://rp.example/cb",
            &[("code", "u:g:s".to_string()), ("state", "x y".to_string())],
        );
        assert_eq!(url, "https://rp.example/cb?code=u%3Ag%3As&state=x%20y");

        let url = append_query("https://rp.example/cb?k=v", &[("code", "c".to_string())]);
        assert_eq!(url, "https://rp.example/cb?k=v&code=c");

        let url = append_fragment(
            "https://rp.example/cb",
            &[("access_token", "t".to_string()), ("token_type", "bearer".to_string())],
        );
        assert_eq!(url, "https://rp.example/cb#access_token=t&token_type=bearer");
    }

    #[test]
    fn redirects_are_crlf_sanitized() {
        let url = append_query(
            "https://rp.example/cb\r\nSet-Cookie:x",
            &[("code", "c".to_string())],
        );
        assert!(!url.contains('\r'));
        assert!(!url.contains('\n'));
    }

    #[tokio::test]
    async fn complete_authorization_rejects_colon_user_ids() {
        let service = service(false);
        let req = authorize_request(
            "response_type=code&client_id=abc&redirect_uri=https%3A%2F%2Frp.example%2Fcb",
        );
        let request = service.parse_auth_request(&req).unwrap();

        let result = service
            .complete_authorization(AuthorizationInput {
                request,
                user_id: "bad:user".to_string(),
                scope: vec![],
                metadata: serde_json::json!({}),
                props: serde_json::json!({}),
            })
            .await;
        assert!(matches!(result, Err(OAuthError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn code_flow_persists_grant_with_code_slot() {
        let store = Arc::new(MemoryStore::new());
        let service = GrantService::new(store.clone(), 3600, false);
        let req = authorize_request(
            "response_type=code&client_id=abc&redirect_uri=https%3A%2F%2Frp.example%2Fcb\
             &state=xyz&code_challenge=ch&code_challenge_method=plain",
        );
        let request = service.parse_auth_request(&req).unwrap();

        let completed = service
            .complete_authorization(AuthorizationInput {
                request,
                user_id: "u1".to_string(),
                scope: vec!["read".to_string()],
                metadata: serde_json::json!({"label": "test"}),
                props: serde_json::json!({"sub": "u1"}),
            })
            .await
            .unwrap();

        assert!(completed.redirect_to.starts_with("https://rp.example/cb?code="));
        assert!(completed.redirect_to.ends_with("&state=xyz"));

        let grant = service
            .get_grant("u1", &completed.grant_id)
            .await
            .unwrap()
            .unwrap();
        assert!(grant.auth_code_id.is_some());
        assert!(grant.auth_code_wrapped_key.is_some());
        assert_eq!(grant.code_challenge.as_deref(), Some("ch"));
        assert_eq!(grant.code_challenge_method.as_deref(), Some("plain"));
        assert!(grant.refresh_token_id.is_none());
    }

    #[tokio::test]
    async fn implicit_flow_mints_token_and_fragment() {
        let store = Arc::new(MemoryStore::new());
        let service = GrantService::new(store.clone(), 3600, true);
        let req = authorize_request(
            "response_type=token&client_id=abc&redirect_uri=https%3A%2F%2Frp.example%2Fcb\
             &scope=read&state=s1",
        );
        let request = service.parse_auth_request(&req).unwrap();

        let completed = service
            .complete_authorization(AuthorizationInput {
                request,
                user_id: "u1".to_string(),
                scope: vec!["read".to_string()],
                metadata: serde_json::json!({}),
                props: serde_json::json!({"sub": "u1"}),
            })
            .await
            .unwrap();

        let fragment = completed.redirect_to.split_once('#').unwrap().1;
        assert!(fragment.contains("access_token="));
        assert!(fragment.contains("token_type=bearer"));
        assert!(fragment.contains("expires_in=3600"));
        assert!(fragment.contains("scope=read"));
        assert!(fragment.contains("state=s1"));

        let grant = service
            .get_grant("u1", &completed.grant_id)
            .await
            .unwrap()
            .unwrap();
        assert!(grant.auth_code_id.is_none());

        // Exactly one token record exists for the grant.
        let page = store
            .list(&store::token_prefix("u1", &completed.grant_id), None, None)
            .await
            .unwrap();
        assert_eq!(page.keys.len(), 1);
    }

    #[tokio::test]
    async fn list_and_revoke() {
        let store = Arc::new(MemoryStore::new());
        let service = GrantService::new(store.clone(), 3600, false);
        let req = authorize_request(
            "response_type=code&client_id=abc&redirect_uri=https%3A%2F%2Frp.example%2Fcb",
        );
        let request = service.parse_auth_request(&req).unwrap();

        let completed = service
            .complete_authorization(AuthorizationInput {
                request,
                user_id: "u1".to_string(),
                scope: vec!["read".to_string()],
                metadata: serde_json::json!({}),
                props: serde_json::json!({"sub": "u1"}),
            })
            .await
            .unwrap();

        let page = service.list_user_grants("u1", None, None).await.unwrap();
        assert_eq!(page.grants.len(), 1);
        assert_eq!(page.grants[0].id, completed.grant_id);

        service.revoke_grant("u1", &completed.grant_id).await.unwrap();
        let page = service.list_user_grants("u1", None, None).await.unwrap();
        assert!(page.grants.is_empty());
    }
}
