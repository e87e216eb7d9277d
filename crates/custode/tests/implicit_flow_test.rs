#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Implicit-flow tests: public clients and fragment token delivery.

mod common;

use std::collections::HashMap;

use axum::http::StatusCode;
use serde_json::json;

use common::{
    bearer_request, body_json, get_request, provider_with, register_client,
};

const REDIRECT_URI: &str = "https://spa.example/cb";

fn fragment_params(redirect_to: &str) -> HashMap<String, String> {
    let url = url::Url::parse(redirect_to).expect("redirect is a URL");
    let fragment = url.fragment().expect("redirect carries a fragment");
    url::form_urlencoded::parse(fragment.as_bytes())
        .into_owned()
        .collect()
}

#[tokio::test]
async fn implicit_flow_returns_token_in_fragment() {
    let (provider, _store) = provider_with(|options| options.allow_implicit_flow = true);

    let registered = register_client(
        &provider,
        json!({
            "redirect_uris": [REDIRECT_URI],
            "token_endpoint_auth_method": "none",
        }),
    )
    .await;
    let client_id = registered["client_id"].as_str().unwrap();
    assert!(registered.get("client_secret").is_none());

    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs([
            ("response_type", "token"),
            ("client_id", client_id),
            ("redirect_uri", REDIRECT_URI),
            ("scope", "read write"),
            ("state", "imp1"),
        ])
        .finish();
    let req = get_request(&format!("/oauth/authorize?{query}"));

    let grants = provider.helpers().grants().clone();
    let request = grants.parse_auth_request(&req).unwrap();
    let scope = request.scope.clone();
    let completed = grants
        .complete_authorization(custode::AuthorizationInput {
            request,
            user_id: "u5".to_string(),
            scope,
            metadata: json!({}),
            props: json!({"sub": "u5"}),
        })
        .await
        .unwrap();

    assert!(completed.redirect_to.starts_with(&format!("{REDIRECT_URI}#")));
    let params = fragment_params(&completed.redirect_to);
    assert_eq!(params["token_type"], "bearer");
    assert_eq!(params["expires_in"], "3600");
    assert_eq!(params["scope"], "read write");
    assert_eq!(params["state"], "imp1");

    // The fragment token is a live access token.
    let resp = provider
        .handle(bearer_request("/api/profile", &params["access_token"]))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["props"], json!({"sub": "u5"}));
}

#[tokio::test]
async fn implicit_flow_is_rejected_when_disabled() {
    let (provider, _store) = common::provider();

    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs([
            ("response_type", "token"),
            ("client_id", "whatever"),
            ("redirect_uri", REDIRECT_URI),
        ])
        .finish();
    let req = get_request(&format!("/oauth/authorize?{query}"));

    let helpers = provider.helpers();
    let result = helpers.grants().parse_auth_request(&req);
    assert!(matches!(
        result,
        Err(custode::OAuthError::InvalidRequest { .. })
    ));
}

#[tokio::test]
async fn public_client_skips_secret_check_at_token_endpoint() {
    let (provider, _store) = provider_with(|options| options.allow_implicit_flow = false);

    let registered = register_client(
        &provider,
        json!({
            "redirect_uris": [REDIRECT_URI],
            "token_endpoint_auth_method": "none",
        }),
    )
    .await;
    let client_id = registered["client_id"].as_str().unwrap();

    let challenge = custode::crypto::s256_challenge("public-verifier");
    let completed = common::complete_code_authorization(
        &provider,
        client_id,
        REDIRECT_URI,
        "read",
        None,
        Some((&challenge, "S256")),
        "u6",
        json!({"sub": "u6"}),
    )
    .await;
    let code = common::query_param(&completed.redirect_to, "code").unwrap();

    // No client_secret in the request at all.
    let resp = provider
        .handle(common::form_request(
            "/oauth/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("code_verifier", "public-verifier"),
                ("client_id", client_id),
            ],
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(body["access_token"].is_string());
}
