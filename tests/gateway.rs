//! End-to-end request handling through the axum middleware.

mod common;

use authwarden::integrations::axum::{
    limit_login_attempts, require_bearer, require_license, unlock_status, AuthenticatedUser,
    LoginIdentity,
};
use authwarden::config::{LicenseConfig, LicenseVerifierKind};
use authwarden::{AuthChain, AuthwardenError, LicenseBootstrap, LicenseGate, RequestContext, SystemClock};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use common::{chain, claims, license_block, license_payload, mint, spawn, PRIMARY_KID, PRIMARY_PEM};
use serde_json::{json, Value};
use std::sync::Arc;

fn app(chain: Arc<AuthChain>) -> Router {
    async fn secure(Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>) -> String {
        claims.preferred_username
    }

    async fn login(
        State(chain): State<Arc<AuthChain>>,
        Extension(LoginIdentity(identity)): Extension<LoginIdentity>,
        Json(body): Json<Value>,
    ) -> Result<&'static str, AuthwardenError> {
        let ctx = RequestContext::new("test", "test");
        if body["password"] == "s3cret" {
            chain.login_succeeded(&identity, &ctx);
            Ok("welcome")
        } else {
            chain.login_failed(&identity, &ctx);
            Err(AuthwardenError::InvalidCredentials)
        }
    }

    let secure_routes = Router::new()
        .route("/api/v1/auth/secure-sample", get(secure))
        .route_layer(middleware::from_fn_with_state(chain.clone(), require_bearer));
    let licensed_routes = Router::new()
        .route("/api/v1/log/trace", get(|| async { "[]" }))
        .route_layer(middleware::from_fn_with_state(chain.clone(), require_bearer))
        .route_layer(middleware::from_fn_with_state(chain.clone(), require_license));
    let login_routes = Router::new()
        .route("/api/v1/auth/login", post(login))
        .route_layer(middleware::from_fn_with_state(chain.clone(), limit_login_attempts));

    Router::new()
        .route("/api/v1/auth/unlock-status", get(unlock_status))
        .merge(secure_routes)
        .merge(licensed_routes)
        .merge(login_routes)
        .with_state(chain)
}

#[tokio::test]
async fn token_with_unknown_kid_is_rejected_as_invalid_token() {
    let (chain, audit) = chain(Arc::new(LicenseGate::new()));
    let base = spawn(app(chain)).await;
    let token = mint(PRIMARY_PEM, Some("xyz"), &claims(300));

    let resp = reqwest::Client::new()
        .get(format!("{}/api/v1/auth/secure-sample", base))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_token");

    let events = audit.recent();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "token_forgery_suspected");
    assert!(events[0].source_address.starts_with("127.0.0.1:"));
}

#[tokio::test]
async fn valid_token_reaches_handler() {
    let (chain, _audit) = chain(Arc::new(LicenseGate::new()));
    let base = spawn(app(chain)).await;
    let token = mint(PRIMARY_PEM, Some(PRIMARY_KID), &claims(300));

    let resp = reqwest::Client::new()
        .get(format!("{}/api/v1/auth/secure-sample", base))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "alice");
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let (chain, _audit) = chain(Arc::new(LicenseGate::new()));
    let base = spawn(app(chain)).await;
    let token = mint(PRIMARY_PEM, Some(PRIMARY_KID), &claims(-60));

    let resp = reqwest::Client::new()
        .get(format!("{}/api/v1/auth/secure-sample", base))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn three_failures_lock_login_then_success_is_refused() {
    let (chain, audit) = chain(Arc::new(LicenseGate::new()));
    let base = spawn(app(chain.clone())).await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/auth/login", base);

    for _ in 0..3 {
        let resp = client
            .post(&url)
            .json(&json!({ "username": "alice", "password": "guess" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
    }
    assert!(chain.tracker().is_locked("alice"));

    let resp = client
        .post(&url)
        .json(&json!({ "username": "alice", "password": "s3cret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let retry: u64 = resp.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry > 1790 && retry <= 1800);

    // Another identity is unaffected.
    let resp = client
        .post(&url)
        .json(&json!({ "username": "bob", "password": "s3cret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let types: Vec<_> = audit.recent().into_iter().map(|e| e.event_type).collect();
    assert_eq!(types.first().map(String::as_str), Some("login"));
    assert!(types.iter().any(|t| t == "login_locked"));
}

#[tokio::test]
async fn license_gate_follows_bootstrap_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("unlock.lic");
    std::fs::write(&good, license_block(&license_payload("web-default"))).unwrap();
    let foreign = dir.path().join("foreign.lic");
    std::fs::write(&foreign, license_block(&license_payload("other-host"))).unwrap();

    let bootstrap = |path: &std::path::Path| {
        let mut config = LicenseConfig::new(LicenseVerifierKind::Ed25519 {
            public_key_hex: common::LICENSE_PUBLIC_KEY_HEX.to_string(),
        });
        config.path = path.to_path_buf();
        let gate = Arc::new(LicenseGate::new());
        let result = LicenseBootstrap::from_config(&config, Arc::new(SystemClock))
            .unwrap()
            .run(&gate);
        (gate, result)
    };

    let token = mint(PRIMARY_PEM, Some(PRIMARY_KID), &claims(300));
    let client = reqwest::Client::new();

    let (gate, result) = bootstrap(&foreign);
    assert!(matches!(result, Err(AuthwardenError::LicenseTamperDetected { .. })));
    let base = spawn(app(chain(gate).0)).await;
    let resp = client
        .get(format!("{}/api/v1/log/trace", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "license_locked");

    let (gate, result) = bootstrap(&good);
    assert!(result.is_ok());
    let base = spawn(app(chain(gate).0)).await;
    let resp = client
        .get(format!("{}/api/v1/log/trace", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Gate open, but the bearer check still applies.
    let resp = client
        .get(format!("{}/api/v1/log/trace", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let status: Value = client
        .get(format!("{}/api/v1/auth/unlock-status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["unlocked"], true);
    assert_eq!(status["device_id"], "web-default");
    assert_eq!(status["branding_required"], true);
}
