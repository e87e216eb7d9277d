//! Custode demo server.
//!
//! Runs the provider as a standalone authorization server for local
//! experiments: an auto-approving consent handler stands in for the
//! embedder's UI and a props-echo handler stands in for the resource
//! server. Clients register through the dynamic-registration endpoint.
//!
//! Not a production deployment: the consent handler approves every
//! request for a fixed demo user.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use custode::{
    AuthorizationInput, HandlerKind, KvStore, MemoryStore, OAuthProvider, ProviderOptions,
    RedisStore, Request, RequestContext, RequestHandler,
};

/// Fixed subject used by the auto-approving consent handler.
const DEMO_USER_ID: &str = "demo-user";

/// Consent handler that approves every authorization request for
/// [`DEMO_USER_ID`].
struct DemoConsent;

#[async_trait]
impl RequestHandler for DemoConsent {
    async fn handle(&self, req: Request, ctx: RequestContext) -> Response {
        if req.method() != Method::GET || req.uri().path() != "/oauth/authorize" {
            return (StatusCode::NOT_FOUND, "not found").into_response();
        }

        let grants = ctx.oauth().grants();
        let request = match grants.parse_auth_request(&req) {
            Ok(request) => request,
            Err(e) => return e.into_response(),
        };

        let scope = request.scope.clone();
        let completed = match grants
            .complete_authorization(AuthorizationInput {
                request,
                user_id: DEMO_USER_ID.to_string(),
                scope,
                metadata: json!({ "issued_by": "custode demo" }),
                props: json!({ "sub": DEMO_USER_ID }),
            })
            .await
        {
            Ok(completed) => completed,
            Err(e) => return e.into_response(),
        };

        (
            StatusCode::FOUND,
            [(header::LOCATION, completed.redirect_to)],
        )
            .into_response()
    }
}

/// Resource handler that echoes the decrypted grant props.
struct DemoApi;

#[async_trait]
impl RequestHandler for DemoApi {
    async fn handle(&self, _req: Request, ctx: RequestContext) -> Response {
        Json(json!({ "props": ctx.props })).into_response()
    }
}

async fn serve_request(State(provider): State<OAuthProvider>, req: Request) -> Response {
    provider.handle(req).await
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .context("PORT must be a valid u16")?;

    let store: Arc<dyn KvStore> = match std::env::var("REDIS_URL") {
        Ok(url) => {
            info!(url = %url, "using Redis store");
            Arc::new(
                RedisStore::connect(&url)
                    .await
                    .context("failed to connect to Redis")?,
            )
        }
        Err(_) => {
            info!("REDIS_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let mut options = ProviderOptions::new(
        HandlerKind::Shared(Arc::new(DemoConsent)),
        HandlerKind::Shared(Arc::new(DemoApi)),
    );
    options.api_routes = vec!["/api/".to_string()];
    options.scopes_supported = std::env::var("CUSTODE_SCOPES")
        .ok()
        .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect());
    options.allow_implicit_flow = std::env::var("CUSTODE_ALLOW_IMPLICIT")
        .is_ok_and(|v| matches!(v.as_str(), "1" | "true" | "yes"));

    let provider =
        OAuthProvider::new(options, store).context("failed to construct provider")?;

    let app = Router::new()
        .fallback(serve_request)
        .layer(TraceLayer::new_for_http())
        .with_state(provider);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "custode demo server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app)
        .await
        .context("server terminated")?;

    Ok(())
}
