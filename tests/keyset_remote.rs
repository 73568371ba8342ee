//! Key-set fetching over real HTTP.
//!
//! The blocking clients are created, used, and dropped on blocking threads.

mod common;

use authwarden::{
    AuthwardenError, CachedKeySetResolver, KeySetResolver, RemoteKeySetResolver, SystemClock,
    TokenConfig, TokenVerifier,
};
use common::{claims, mint, spawn_jwks_server, ISSUER, PRIMARY_KID, PRIMARY_PEM, ROGUE_PEM};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn config(url: &str) -> TokenConfig {
    let mut config = TokenConfig::new(url, ISSUER);
    config.fetch_timeout = Duration::from_secs(2);
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_resolver_decodes_signing_keys_only() {
    let (url, hits) = spawn_jwks_server(common::jwks_document()).await;

    let keys = tokio::task::spawn_blocking(move || {
        let resolver = RemoteKeySetResolver::new("it", &config(&url)).unwrap();
        resolver.resolve()
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(keys.len(), 1);
    assert!(keys.get(PRIMARY_KID).is_some());
    assert!(keys.get("enc-kid").is_none());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unavailable_endpoint_is_fetch_error() {
    let (url, _hits) = spawn_jwks_server(common::jwks_document()).await;
    let broken = url.replace("/certs", "/broken");

    let result = tokio::task::spawn_blocking(move || {
        let resolver = RemoteKeySetResolver::new("it", &config(&broken)).unwrap();
        resolver.resolve()
    })
    .await
    .unwrap();

    assert!(matches!(result, Err(AuthwardenError::KeySetFetch(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn cached_resolver_fetches_once_per_ttl() {
    let (url, hits) = spawn_jwks_server(common::jwks_document()).await;

    tokio::task::spawn_blocking(move || {
        let config = config(&url);
        let remote = RemoteKeySetResolver::new("it", &config).unwrap();
        let cached = CachedKeySetResolver::new(remote, &config, Arc::new(SystemClock));
        for _ in 0..5 {
            assert!(cached.lookup(PRIMARY_KID).unwrap().is_some());
        }
    })
    .await
    .unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn verifier_from_config_checks_tokens_against_remote_keys() {
    let (url, _hits) = spawn_jwks_server(common::jwks_document()).await;
    let good = mint(PRIMARY_PEM, Some(PRIMARY_KID), &claims(300));
    let rogue = mint(ROGUE_PEM, Some(PRIMARY_KID), &claims(300));
    let unknown = mint(PRIMARY_PEM, Some("xyz"), &claims(300));

    tokio::task::spawn_blocking(move || {
        let verifier = TokenVerifier::from_config("it", &config(&url), Arc::new(SystemClock)).unwrap();

        let claims = verifier.verify(&good, ISSUER).unwrap();
        assert_eq!(claims.preferred_username, "alice");

        assert!(matches!(
            verifier.verify(&rogue, ISSUER),
            Err(AuthwardenError::SignatureInvalid)
        ));
        assert!(matches!(
            verifier.verify(&unknown, ISSUER),
            Err(AuthwardenError::KeyNotFound { .. })
        ));
        assert!(matches!(
            verifier.verify(&good, "http://keycloak:8080/realms/other"),
            Err(AuthwardenError::IssuerMismatch { .. })
        ));
    })
    .await
    .unwrap();
}
