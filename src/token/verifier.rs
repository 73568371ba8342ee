//! Bearer-token verification against the published key set.
//!
//! Verification order:
//! 1. Reject algorithms outside the RSA family
//! 2. Require a key id in the token header
//! 3. Resolve the key set and find that exact key id
//! 4. Verify the signature, then `exp`/`nbf` against the clock
//! 5. Compare the issuer byte for byte with the pinned issuer
//!
//! Pinning both the kid and the issuer keeps a token signed by some other
//! trusted realm from passing here.

use crate::clock::{to_chrono, Clock};
use crate::config::TokenConfig;
use crate::keyset::{CachedKeySetResolver, KeySetResolver, RemoteKeySetResolver};
use crate::protocol::models::Claims;
use crate::token::expiry::check_token_times;
use crate::AuthwardenError;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Validates bearer tokens and extracts their claims.
pub struct TokenVerifier {
    resolver: Arc<dyn KeySetResolver>,
    clock: Arc<dyn Clock>,
    leeway: chrono::Duration,
    audience: Option<String>,
}

impl TokenVerifier {
    /// Verifier over an arbitrary key-set resolver, with no leeway and no audience pin.
    pub fn new(resolver: Arc<dyn KeySetResolver>, clock: Arc<dyn Clock>) -> Self {
        Self {
            resolver,
            clock,
            leeway: chrono::Duration::zero(),
            audience: None,
        }
    }

    /// Build the remote resolver described by `config`, cached unless its TTL is zero.
    pub fn from_config(
        app_name: &str,
        config: &TokenConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthwardenError> {
        let remote = RemoteKeySetResolver::new(app_name, config)?;
        let resolver: Arc<dyn KeySetResolver> = if config.key_set_ttl.is_zero() {
            Arc::new(remote)
        } else {
            Arc::new(CachedKeySetResolver::new(remote, config, clock.clone()))
        };

        Ok(Self::new(resolver, clock)
            .with_leeway(config.leeway)
            .with_audience(config.audience.clone()))
    }

    /// Tolerate clock skew on `exp` and `nbf`.
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = to_chrono(leeway);
        self
    }

    /// Require the given audience.
    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = audience;
        self
    }

    /// Verify `token` and return its claims.
    ///
    /// # Errors
    /// - `UnsupportedAlgorithm` - header algorithm is not RS*/PS*
    /// - `KeyNotFound` - no kid, or kid absent from the key set
    /// - `KeySetFetch` - key set unavailable
    /// - `SignatureInvalid` - signature does not verify
    /// - `TokenExpired` / `TokenNotYetValid` - time claims out of range
    /// - `IssuerMismatch` - `iss` differs from `expected_issuer` in any way
    /// - `TokenMalformed` - undecodable token or missing required claims
    pub fn verify(&self, token: &str, expected_issuer: &str) -> Result<Claims, AuthwardenError> {
        let header = decode_header(token)
            .map_err(|e| AuthwardenError::TokenMalformed(format!("Bad token header: {}", e)))?;

        if !is_rsa_family(header.alg) {
            return Err(AuthwardenError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| AuthwardenError::KeyNotFound { kid: String::new() })?;

        let key = self
            .resolver
            .lookup(&kid)?
            .ok_or_else(|| AuthwardenError::KeyNotFound { kid: kid.clone() })?;

        let alg_name = format!("{:?}", header.alg);
        if !key.algorithm.is_empty() && key.algorithm != alg_name {
            return Err(AuthwardenError::UnsupportedAlgorithm(format!(
                "{} token for {} key {}",
                alg_name, key.algorithm, kid
            )));
        }

        let decoding_key = DecodingKey::from_rsa_components(&key.modulus, &key.exponent)
            .map_err(|_| AuthwardenError::SignatureInvalid)?;

        let mut validation = Validation::new(header.alg);
        // Time claims are checked against the injected clock below.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let claims = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(map_jwt_error)?
            .claims;

        check_token_times(claims.exp, claims.nbf, self.leeway, self.clock.as_ref())?;

        if claims.iss != expected_issuer {
            return Err(AuthwardenError::IssuerMismatch {
                expected: expected_issuer.to_string(),
                actual: claims.iss,
            });
        }

        claims.ensure_complete()?;

        debug!(kid = %kid, sub = %claims.sub, "Token verified");
        Ok(claims)
    }
}

fn is_rsa_family(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
    )
}

fn map_jwt_error(error: jsonwebtoken::errors::Error) -> AuthwardenError {
    match error.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidRsaKey(_) => AuthwardenError::SignatureInvalid,
        ErrorKind::ExpiredSignature => AuthwardenError::TokenExpired,
        ErrorKind::ImmatureSignature => AuthwardenError::TokenNotYetValid,
        ErrorKind::InvalidAlgorithm => AuthwardenError::UnsupportedAlgorithm(error.to_string()),
        _ => AuthwardenError::TokenMalformed(error.to_string()),
    }
}
