//! Shared fixtures for provider integration tests.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Json;
use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use custode::{
    CompletedAuthorization, HandlerKind, MemoryStore, OAuthProvider, ProviderOptions, Request,
    RequestContext, RequestHandler,
};

/// Origin used for all test requests (absolute-form URIs).
pub const ORIGIN: &str = "http://as.example";

/// Default handler standing in for the embedder's UI.
pub struct NotFoundHandler;

#[async_trait]
impl RequestHandler for NotFoundHandler {
    async fn handle(&self, _req: Request, _ctx: RequestContext) -> Response {
        (StatusCode::NOT_FOUND, "default handler").into_response()
    }
}

/// API handler that echoes the decrypted props back as JSON.
pub struct EchoApiHandler;

#[async_trait]
impl RequestHandler for EchoApiHandler {
    async fn handle(&self, _req: Request, ctx: RequestContext) -> Response {
        Json(json!({ "props": ctx.props })).into_response()
    }
}

/// A provider over a fresh in-memory store, with test handlers and one
/// `/api/` route. `configure` adjusts the options before construction.
pub fn provider_with(
    configure: impl FnOnce(&mut ProviderOptions),
) -> (OAuthProvider, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let mut options = ProviderOptions::new(
        HandlerKind::Shared(Arc::new(NotFoundHandler)),
        HandlerKind::Shared(Arc::new(EchoApiHandler)),
    );
    options.api_routes = vec!["/api/".to_string()];
    configure(&mut options);

    let provider = OAuthProvider::new(options, store.clone()).expect("test options are valid");
    (provider, store)
}

pub fn provider() -> (OAuthProvider, Arc<MemoryStore>) {
    provider_with(|_| {})
}

pub fn get_request(path: &str) -> Request {
    axum::http::Request::builder()
        .method("GET")
        .uri(format!("{ORIGIN}{path}"))
        .body(Body::empty())
        .expect("request is valid")
}

pub fn form_request(path: &str, fields: &[(&str, &str)]) -> Request {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish();
    axum::http::Request::builder()
        .method("POST")
        .uri(format!("{ORIGIN}{path}"))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("request is valid")
}

pub fn json_request(path: &str, body: &Value) -> Request {
    axum::http::Request::builder()
        .method("POST")
        .uri(format!("{ORIGIN}{path}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request is valid")
}

pub fn bearer_request(path: &str, token: &str) -> Request {
    axum::http::Request::builder()
        .method("GET")
        .uri(format!("{ORIGIN}{path}"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request is valid")
}

pub async fn body_json(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body is readable");
    serde_json::from_slice(&bytes).expect("body is JSON")
}

/// Register a client through the dynamic-registration endpoint and return
/// the 201 response body.
pub async fn register_client(provider: &OAuthProvider, metadata: Value) -> Value {
    let resp = provider
        .handle(json_request("/oauth/register", &metadata))
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await
}

/// Drive the authorization-helper surface the way a consent flow would:
/// parse the query, then complete the authorization for `user_id`.
pub async fn complete_code_authorization(
    provider: &OAuthProvider,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    state: Option<&str>,
    challenge: Option<(&str, &str)>,
    user_id: &str,
    props: Value,
) -> CompletedAuthorization {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("response_type", "code");
    query.append_pair("client_id", client_id);
    query.append_pair("redirect_uri", redirect_uri);
    query.append_pair("scope", scope);
    if let Some(state) = state {
        query.append_pair("state", state);
    }
    if let Some((challenge, method)) = challenge {
        query.append_pair("code_challenge", challenge);
        query.append_pair("code_challenge_method", method);
    }
    let req = get_request(&format!("/oauth/authorize?{}", query.finish()));

    let grants = provider.helpers().grants().clone();
    let request = grants.parse_auth_request(&req).expect("request parses");
    let granted_scope = request.scope.clone();

    grants
        .complete_authorization(custode::AuthorizationInput {
            request,
            user_id: user_id.to_string(),
            scope: granted_scope,
            metadata: json!({}),
            props,
        })
        .await
        .expect("authorization completes")
}

/// Pull a named query parameter out of a redirect URL.
pub fn query_param(redirect_to: &str, name: &str) -> Option<String> {
    let url = url::Url::parse(redirect_to).expect("redirect is a URL");
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
