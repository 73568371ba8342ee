//! Shared helpers for integration tests.

#![allow(dead_code)]

use authwarden::audit::{AuditSink, MemoryAuditSink};
use authwarden::{
    AuthChain, KeySet, LicenseGate, LockoutPolicy, LoginAttemptTracker, SigningKey,
    StaticKeySetResolver, SystemClock, TokenVerifier,
};
use axum::routing::get;
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::Signer;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const PRIMARY_PEM: &str = include_str!("../fixtures/rsa_primary.pem");
pub const PRIMARY_MODULUS: &str = include_str!("../fixtures/rsa_primary.n");
pub const ROGUE_PEM: &str = include_str!("../fixtures/rsa_rogue.pem");
pub const EXPONENT: &str = "AQAB";

pub const ISSUER: &str = "http://keycloak:8080/realms/acme";
pub const PRIMARY_KID: &str = "primary-kid";

// RFC 8032 test vector 1 (DO NOT USE IN PRODUCTION)
pub const LICENSE_PRIVATE_KEY_HEX: &str =
    "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
pub const LICENSE_PUBLIC_KEY_HEX: &str =
    "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims for `alice` expiring `ttl_secs` from now.
pub fn claims(ttl_secs: i64) -> Value {
    let exp = now() + ttl_secs;
    json!({
        "iss": ISSUER,
        "sub": "f3b2c1d0-0000-4000-8000-000000000001",
        "preferred_username": "alice",
        "email": "alice@example.com",
        "exp": exp,
        "iat": now(),
    })
}

pub fn mint(pem: &str, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("fixture PEM");
    encode(&header, claims, &key).expect("encode token")
}

/// JWKS document as Keycloak publishes it, with an encryption key mixed in.
pub fn jwks_document() -> Value {
    json!({
        "keys": [
            {
                "kid": PRIMARY_KID,
                "kty": "RSA",
                "alg": "RS256",
                "use": "sig",
                "n": PRIMARY_MODULUS,
                "e": EXPONENT
            },
            {
                "kid": "enc-kid",
                "kty": "RSA",
                "alg": "RSA-OAEP",
                "use": "enc",
                "n": PRIMARY_MODULUS,
                "e": EXPONENT
            }
        ]
    })
}

pub fn primary_key_set() -> KeySet {
    KeySet::from_keys([SigningKey {
        id: PRIMARY_KID.to_string(),
        algorithm: "RS256".to_string(),
        modulus: PRIMARY_MODULUS.to_string(),
        exponent: EXPONENT.to_string(),
    }])
}

/// Serve `document` at `/certs` on an OS-assigned port. Returns the URL and a hit counter.
pub async fn spawn_jwks_server(document: Value) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new()
        .route(
            "/certs",
            get(move || {
                let counter = counter.clone();
                let document = document.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(document)
                }
            }),
        )
        .route(
            "/broken",
            get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );

    let base = spawn(app).await;
    (format!("{}/certs", base), hits)
}

/// Serve `app` with connect info on an OS-assigned port. Returns the base URL.
pub async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}

/// Chain over the static primary key set with default lockout policy.
pub fn chain(gate: Arc<LicenseGate>) -> (Arc<AuthChain>, Arc<MemoryAuditSink>) {
    let clock = Arc::new(SystemClock);
    let verifier = TokenVerifier::new(
        Arc::new(StaticKeySetResolver::new(primary_key_set())),
        clock.clone(),
    );
    let tracker = Arc::new(LoginAttemptTracker::new(LockoutPolicy::default(), clock.clone()));
    let audit = Arc::new(MemoryAuditSink::new(64));
    let chain = AuthChain::from_parts(
        verifier,
        tracker,
        gate,
        audit.clone() as Arc<dyn AuditSink>,
        ISSUER,
        clock,
    );
    (Arc::new(chain), audit)
}

/// `<base64 sig>||<payload>` signed with the RFC 8032 key.
pub fn license_block(payload: &str) -> String {
    let bytes: [u8; 32] = hex::decode(LICENSE_PRIVATE_KEY_HEX)
        .unwrap()
        .try_into()
        .unwrap();
    let key = ed25519_dalek::SigningKey::from_bytes(&bytes);
    let signature = key.sign(payload.as_bytes());
    format!("{}||{}", STANDARD.encode(signature.to_bytes()), payload)
}

pub fn license_payload(device_id: &str) -> String {
    json!({
        "email": "ops@example.com",
        "device_id": device_id,
        "issued_at": "2025-01-01T00:00:00Z",
        "engine_hash": "",
        "branding_required": true
    })
    .to_string()
}
