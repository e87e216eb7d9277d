//! The provider facade: construction and top-level dispatch.

use std::sync::Arc;

use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::config::ProviderOptions;
use crate::handler::{Request, RequestContext};
use crate::middleware::bearer;
use crate::routes::{self, METADATA_PATH, metadata, register, token};
use crate::services::{ClientService, GrantService, OAuthHelpers};
use crate::store::KvStore;

/// Which first-party surface a request landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteClass {
    Preflight,
    Metadata,
    Token,
    Registration,
    Api,
    Default,
}

struct ProviderInner {
    options: ProviderOptions,
    store: Arc<dyn KvStore>,
    clients: ClientService,
    grants: GrantService,
}

/// An embeddable OAuth 2.1 authorization server.
///
/// One value serves every request; cloning is cheap and all state lives in
/// the key-value store.
#[derive(Clone)]
pub struct OAuthProvider {
    inner: Arc<ProviderInner>,
}

impl OAuthProvider {
    /// Validate `options` and assemble the provider over `store`.
    pub fn new(options: ProviderOptions, store: Arc<dyn KvStore>) -> anyhow::Result<Self> {
        options.validate()?;

        let clients = ClientService::new(store.clone());
        let grants = GrantService::new(
            store.clone(),
            options.access_token_ttl,
            options.allow_implicit_flow,
        );

        Ok(Self {
            inner: Arc::new(ProviderInner {
                options,
                store,
                clients,
                grants,
            }),
        })
    }

    /// The management surface handed to embedded handlers; also usable
    /// directly by the embedding application.
    pub fn helpers(&self) -> OAuthHelpers {
        OAuthHelpers::new(self.inner.clients.clone(), self.inner.grants.clone())
    }

    /// Serve one request: route to metadata, token, registration, the API
    /// gate, or the default handler, and add CORS headers to first-party
    /// responses.
    pub async fn handle(&self, req: Request) -> Response {
        let origin = req.headers().get(header::ORIGIN).cloned();
        let class = self.classify(&req);
        let resp = self.dispatch(class, req).await;

        match (&origin, class) {
            (Some(origin), class) if class != RouteClass::Default => {
                routes::apply_cors(resp, origin)
            }
            _ => resp,
        }
    }

    fn classify(&self, req: &Request) -> RouteClass {
        let options = &self.inner.options;
        let path = req.uri().path();

        let first_party = path == METADATA_PATH
            || routes::path_matches(&options.token_endpoint, path)
            || options
                .client_registration_endpoint
                .as_deref()
                .is_some_and(|e| routes::path_matches(e, path))
            || options
                .api_routes
                .iter()
                .any(|r| routes::prefix_matches(r, path));

        if req.method() == Method::OPTIONS && first_party {
            return RouteClass::Preflight;
        }
        if path == METADATA_PATH {
            return RouteClass::Metadata;
        }
        if routes::path_matches(&options.token_endpoint, path) {
            return RouteClass::Token;
        }
        if options
            .client_registration_endpoint
            .as_deref()
            .is_some_and(|e| routes::path_matches(e, path))
        {
            return RouteClass::Registration;
        }
        if options
            .api_routes
            .iter()
            .any(|r| routes::prefix_matches(r, path))
        {
            return RouteClass::Api;
        }
        RouteClass::Default
    }

    async fn dispatch(&self, class: RouteClass, req: Request) -> Response {
        let inner = self.inner.as_ref();
        match class {
            RouteClass::Preflight => StatusCode::NO_CONTENT.into_response(),
            RouteClass::Metadata => metadata::handle(&inner.options, &req),
            RouteClass::Token => token::handle(&inner.clients, &inner.grants, req).await,
            RouteClass::Registration => {
                register::handle(&inner.clients, &inner.options, req).await
            }
            RouteClass::Api => match bearer::authenticate(inner.store.as_ref(), req.headers()).await {
                Ok(props) => {
                    let mut ctx = RequestContext::new(self.helpers());
                    ctx.props = Some(props);
                    inner.options.api_handler.dispatch(req, ctx).await
                }
                Err(e) => e.into_response(),
            },
            RouteClass::Default => {
                let ctx = RequestContext::new(self.helpers());
                inner.options.default_handler.dispatch(req, ctx).await
            }
        }
    }
}
