//! Request handler contract and per-request context.
//!
//! Embedders supply two handlers: the default handler (login, consent, and
//! any other unauthenticated pages) and the API handler (protected
//! resources, invoked only after bearer validation). Both are expressed as
//! [`HandlerKind`]: either one long-lived handler shared across requests,
//! or a factory that constructs a fresh handler per request.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::response::Response;
use serde_json::Value;

use crate::services::OAuthHelpers;

/// The HTTP request type accepted by the provider and its handlers.
pub type Request = axum::http::Request<Body>;

/// Serves one request.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, req: Request, ctx: RequestContext) -> Response;
}

/// Builds a fresh [`RequestHandler`] for each request.
#[async_trait]
pub trait RequestHandlerFactory: Send + Sync {
    async fn instantiate(&self, ctx: &RequestContext) -> Box<dyn RequestHandler>;
}

/// The two accepted handler shapes.
#[derive(Clone)]
pub enum HandlerKind {
    /// One handler serving every request.
    Shared(Arc<dyn RequestHandler>),
    /// A factory invoked once per request.
    PerRequest(Arc<dyn RequestHandlerFactory>),
}

impl HandlerKind {
    pub(crate) async fn dispatch(&self, req: Request, ctx: RequestContext) -> Response {
        match self {
            Self::Shared(handler) => handler.handle(req, ctx).await,
            Self::PerRequest(factory) => {
                let handler = factory.instantiate(&ctx).await;
                handler.handle(req, ctx).await
            }
        }
    }
}

/// Per-request context handed to every handler.
#[derive(Clone)]
pub struct RequestContext {
    oauth: OAuthHelpers,

    /// Decrypted grant props. `Some` only on requests that passed the API
    /// gate; the default handler always sees `None`.
    pub props: Option<Value>,
}

impl RequestContext {
    pub(crate) fn new(oauth: OAuthHelpers) -> Self {
        Self { oauth, props: None }
    }

    /// The provider's management surface: client registry and grant
    /// operations.
    pub fn oauth(&self) -> &OAuthHelpers {
        &self.oauth
    }
}
