//! Key-set wire structs, the indexed key set, and typed token claims.

use crate::AuthwardenError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Raw JSON Web Key Set document: `{ "keys": [...] }`.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    /// Published keys, in document order.
    pub keys: Vec<JsonWebKey>,
}

/// One entry of the published key set. All members are text-encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonWebKey {
    /// Key id.
    #[serde(default)]
    pub kid: Option<String>,
    /// Key type; only `RSA` is used.
    pub kty: String,
    /// Declared algorithm.
    #[serde(default)]
    pub alg: Option<String>,
    /// Intended use (`sig` or `enc`).
    #[serde(rename = "use", default)]
    pub key_use: Option<String>,
    /// Base64url modulus.
    #[serde(default)]
    pub n: Option<String>,
    /// Base64url exponent.
    #[serde(default)]
    pub e: Option<String>,
}

/// RSA public signing key, immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKey {
    /// Key id (`kid`).
    pub id: String,

    /// Declared algorithm, e.g. `RS256`. Empty when the publisher omitted it.
    pub algorithm: String,

    /// Base64url big-endian modulus.
    pub modulus: String,

    /// Base64url big-endian public exponent.
    pub exponent: String,
}

/// Snapshot of the published keys, indexed by key id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: HashMap<String, SigningKey>,
}

impl KeySet {
    /// Build a set from keys; the first key wins on duplicate ids.
    pub fn from_keys(keys: impl IntoIterator<Item = SigningKey>) -> Self {
        let mut map = HashMap::new();
        for key in keys {
            map.entry(key.id.clone()).or_insert(key);
        }
        Self { keys: map }
    }

    /// Look up a key by id.
    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate the key ids.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

impl From<JwksDocument> for KeySet {
    fn from(doc: JwksDocument) -> Self {
        let usable = doc.keys.into_iter().filter_map(|jwk| {
            if jwk.kty != "RSA" {
                debug!(kty = %jwk.kty, "Skipping non-RSA key");
                return None;
            }
            if matches!(jwk.key_use.as_deref(), Some(u) if u != "sig") {
                debug!(kid = ?jwk.kid, "Skipping key not meant for signatures");
                return None;
            }
            let (Some(id), Some(modulus), Some(exponent)) = (jwk.kid, jwk.n, jwk.e) else {
                debug!("Skipping key without kid, n, or e");
                return None;
            };
            Some(SigningKey {
                id,
                algorithm: jwk.alg.unwrap_or_default(),
                modulus,
                exponent,
            })
        });
        KeySet::from_keys(usable)
    }
}

/// Parse a raw key-set document into a [`KeySet`].
pub fn parse_key_set(body: &[u8]) -> Result<KeySet, AuthwardenError> {
    let doc: JwksDocument = serde_json::from_slice(body)
        .map_err(|e| AuthwardenError::KeySetFetch(format!("Malformed key set: {}", e)))?;
    Ok(doc.into())
}

/// Verified token claims.
///
/// Required members are enforced at decode time; everything else lands in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer (`iss`).
    pub iss: String,

    /// Subject (`sub`).
    pub sub: String,

    /// Login name (`preferred_username`).
    pub preferred_username: String,

    /// Expiry, seconds since the epoch.
    pub exp: i64,

    /// Issued-at, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not-before, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Email address, when the provider includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Any remaining claims.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    /// Reject claim sets whose required strings are empty.
    pub fn ensure_complete(&self) -> Result<(), AuthwardenError> {
        for (name, value) in [
            ("iss", &self.iss),
            ("sub", &self.sub),
            ("preferred_username", &self.preferred_username),
        ] {
            if value.is_empty() {
                return Err(AuthwardenError::TokenMalformed(format!(
                    "claim {} is empty",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYCLOAK_CERTS: &str = r#"{
        "keys": [
            {"kid": "sig-1", "kty": "RSA", "alg": "RS256", "use": "sig", "n": "AQAB-modulus", "e": "AQAB"},
            {"kid": "enc-1", "kty": "RSA", "alg": "RSA-OAEP", "use": "enc", "n": "xyz", "e": "AQAB"},
            {"kid": "ec-1", "kty": "EC", "crv": "P-256", "x": "a", "y": "b"},
            {"kid": "sig-1", "kty": "RSA", "alg": "RS512", "use": "sig", "n": "dup", "e": "AQAB"},
            {"kty": "RSA", "n": "no-kid", "e": "AQAB"}
        ]
    }"#;

    #[test]
    fn parses_and_filters_keycloak_certs() {
        let set = parse_key_set(KEYCLOAK_CERTS.as_bytes()).unwrap();
        assert_eq!(set.len(), 1);
        let key = set.get("sig-1").unwrap();
        assert_eq!(key.algorithm, "RS256");
        assert_eq!(key.modulus, "AQAB-modulus");
        assert!(set.get("enc-1").is_none());
        assert!(set.get("ec-1").is_none());
    }

    #[test]
    fn key_without_use_is_accepted() {
        let set = parse_key_set(br#"{"keys":[{"kid":"k","kty":"RSA","n":"n","e":"AQAB"}]}"#).unwrap();
        assert_eq!(set.get("k").unwrap().algorithm, "");
    }

    #[test]
    fn malformed_json_is_fetch_error() {
        let result = parse_key_set(b"<html>gateway timeout</html>");
        assert!(matches!(result, Err(AuthwardenError::KeySetFetch(_))));
        let result = parse_key_set(br#"{"nokeys": []}"#);
        assert!(matches!(result, Err(AuthwardenError::KeySetFetch(_))));
    }

    #[test]
    fn claims_capture_extra_members() {
        let claims: Claims = serde_json::from_str(
            r#"{"iss":"http://idp","sub":"u-1","preferred_username":"alice","exp":10,
                "email":"alice@example.com","realm_access":{"roles":["admin"]}}"#,
        )
        .unwrap();
        assert_eq!(claims.preferred_username, "alice");
        assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
        assert!(claims.extra.contains_key("realm_access"));
        assert!(claims.ensure_complete().is_ok());
    }

    #[test]
    fn claims_missing_username_fail_to_decode() {
        let result: Result<Claims, _> =
            serde_json::from_str(r#"{"iss":"http://idp","sub":"u-1","exp":10}"#);
        assert!(result.is_err());
    }

    #[test]
    fn empty_username_is_incomplete() {
        let claims: Claims = serde_json::from_str(
            r#"{"iss":"http://idp","sub":"u-1","preferred_username":"","exp":10}"#,
        )
        .unwrap();
        assert!(matches!(
            claims.ensure_complete(),
            Err(AuthwardenError::TokenMalformed(_))
        ));
    }
}
