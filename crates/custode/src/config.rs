//! Provider configuration.

use anyhow::{Context, Result, ensure};
use url::Url;

use crate::handler::HandlerKind;

/// Default access-token lifetime in seconds (1 hour).
pub const DEFAULT_ACCESS_TOKEN_TTL: u64 = 3600;

/// Lifetime of a grant holding an unredeemed authorization code
/// (10 minutes). Redemption re-persists the grant without expiry.
pub const AUTH_CODE_TTL: u64 = 600;

/// Options accepted by [`crate::OAuthProvider::new`].
///
/// Endpoints are absolute paths (resolved against each request's origin)
/// or full http(s) URLs. Validation happens once, at construction.
#[derive(Clone)]
pub struct ProviderOptions {
    /// Handler for everything the provider does not serve itself:
    /// login, consent, and any other unauthenticated pages.
    pub default_handler: HandlerKind,

    /// Handler for protected resource requests, invoked only after bearer
    /// validation with decrypted props on the request context.
    pub api_handler: HandlerKind,

    /// URL path prefixes gated by the bearer check.
    pub api_routes: Vec<String>,

    /// Authorization endpoint, served by the default handler but
    /// advertised in metadata.
    pub authorize_endpoint: String,

    /// Token endpoint, served by the provider.
    pub token_endpoint: String,

    /// RFC 7591 dynamic-registration endpoint; `None` disables it.
    pub client_registration_endpoint: Option<String>,

    /// Scopes advertised in metadata.
    pub scopes_supported: Option<Vec<String>>,

    /// Access-token lifetime in seconds.
    pub access_token_ttl: u64,

    /// Whether `response_type=token` is accepted.
    pub allow_implicit_flow: bool,

    /// Refuse dynamic registration of public clients
    /// (`token_endpoint_auth_method = "none"`).
    pub disallow_public_client_registration: bool,
}

impl ProviderOptions {
    /// Options with conventional endpoints and defaults. Callers adjust
    /// the public fields before handing the result to the provider.
    pub fn new(default_handler: HandlerKind, api_handler: HandlerKind) -> Self {
        Self {
            default_handler,
            api_handler,
            api_routes: Vec::new(),
            authorize_endpoint: "/oauth/authorize".to_string(),
            token_endpoint: "/oauth/token".to_string(),
            client_registration_endpoint: Some("/oauth/register".to_string()),
            scopes_supported: None,
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            allow_implicit_flow: false,
            disallow_public_client_registration: false,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        ensure!(
            !self.api_routes.is_empty(),
            "at least one API route is required"
        );
        for route in &self.api_routes {
            validate_endpoint(route).with_context(|| format!("invalid API route {route:?}"))?;
        }
        validate_endpoint(&self.authorize_endpoint).context("invalid authorize_endpoint")?;
        validate_endpoint(&self.token_endpoint).context("invalid token_endpoint")?;
        if let Some(endpoint) = &self.client_registration_endpoint {
            validate_endpoint(endpoint).context("invalid client_registration_endpoint")?;
        }
        ensure!(
            self.access_token_ttl > 0,
            "access_token_ttl must be nonzero"
        );
        Ok(())
    }
}

/// An endpoint is an absolute path or a full http(s) URL.
fn validate_endpoint(endpoint: &str) -> Result<()> {
    if endpoint.starts_with('/') {
        return Ok(());
    }
    let url = Url::parse(endpoint).context("must be an absolute path or a full URL")?;
    ensure!(
        matches!(url.scheme(), "http" | "https"),
        "endpoint URL must use http or https"
    );
    Ok(())
}
