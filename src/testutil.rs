//! Shared fixtures for unit tests: RSA keys, token minting, license signing.

use crate::protocol::models::{KeySet, SigningKey};
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::Signer;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

pub const PRIMARY_PEM: &str = include_str!("../tests/fixtures/rsa_primary.pem");
pub const PRIMARY_MODULUS: &str = include_str!("../tests/fixtures/rsa_primary.n");
pub const ROGUE_PEM: &str = include_str!("../tests/fixtures/rsa_rogue.pem");
pub const ROGUE_MODULUS: &str = include_str!("../tests/fixtures/rsa_rogue.n");
pub const EXPONENT: &str = "AQAB";

pub const ISSUER: &str = "http://keycloak:8080/realms/acme";
pub const PRIMARY_KID: &str = "primary-kid";

// RFC 8032 test vector 1 (DO NOT USE IN PRODUCTION)
pub const LICENSE_PRIVATE_KEY_HEX: &str =
    "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
pub const LICENSE_PUBLIC_KEY_HEX: &str =
    "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

pub fn signing_key(kid: &str, modulus: &str) -> SigningKey {
    SigningKey {
        id: kid.to_string(),
        algorithm: "RS256".to_string(),
        modulus: modulus.to_string(),
        exponent: EXPONENT.to_string(),
    }
}

/// Key set holding only the primary key under `PRIMARY_KID`.
pub fn primary_key_set() -> KeySet {
    KeySet::from_keys([signing_key(PRIMARY_KID, PRIMARY_MODULUS)])
}

/// Claims for `alice` from `ISSUER`, expiring at `exp`.
pub fn claims(exp: i64) -> Value {
    json!({
        "iss": ISSUER,
        "sub": "f3b2c1d0-0000-4000-8000-000000000001",
        "preferred_username": "alice",
        "email": "alice@example.com",
        "exp": exp,
        "iat": exp - 300,
        "azp": "acme-client",
    })
}

/// RS256 token signed with `pem`, carrying `kid` when given.
pub fn mint(pem: &str, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("fixture PEM");
    encode(&header, claims, &key).expect("encode token")
}

/// Sign a license payload: `<base64 sig>||<payload>`.
pub fn license_block(payload: &str) -> String {
    let bytes: [u8; 32] = hex::decode(LICENSE_PRIVATE_KEY_HEX)
        .unwrap()
        .try_into()
        .unwrap();
    let key = ed25519_dalek::SigningKey::from_bytes(&bytes);
    let signature = key.sign(payload.as_bytes());
    format!("{}||{}", STANDARD.encode(signature.to_bytes()), payload)
}
