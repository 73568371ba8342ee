//! License signature verification.

use crate::config::LicenseVerifierKind;
use crate::AuthwardenError;
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use std::sync::Arc;
use tracing::{debug, warn};

/// Checks a detached license signature over the raw payload bytes.
pub trait SignatureVerifier: Send + Sync {
    /// `true` when `signature_b64` is a valid signature of `payload`.
    fn verify_signature(&self, signature_b64: &str, payload: &[u8]) -> bool;
}

/// Ed25519 verifier bound to one public key.
#[derive(Debug, Clone)]
pub struct Ed25519SignatureVerifier {
    key: VerifyingKey,
}

impl Ed25519SignatureVerifier {
    /// Decode a hex-encoded 32-byte Ed25519 public key.
    pub fn from_public_key_hex(hex_key: &str) -> Result<Self, AuthwardenError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| AuthwardenError::ConfigError(format!("Invalid public key hex: {}", e)))?;

        let key_array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AuthwardenError::ConfigError("Public key must be 32 bytes".to_string()))?;

        let key = VerifyingKey::from_bytes(&key_array).map_err(|e| {
            AuthwardenError::ConfigError(format!("Invalid Ed25519 public key: {}", e))
        })?;

        Ok(Self { key })
    }
}

impl SignatureVerifier for Ed25519SignatureVerifier {
    fn verify_signature(&self, signature_b64: &str, payload: &[u8]) -> bool {
        let Ok(sig_bytes) = STANDARD.decode(signature_b64.trim()) else {
            debug!("License signature is not base64");
            return false;
        };

        let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
            debug!(len = sig_bytes.len(), "License signature has wrong length");
            return false;
        };

        self.key
            .verify(payload, &Signature::from_bytes(&sig_array))
            .is_ok()
    }
}

/// Accepts every signature. For local development without a signing key.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubSignatureVerifier;

impl SignatureVerifier for StubSignatureVerifier {
    fn verify_signature(&self, _signature_b64: &str, _payload: &[u8]) -> bool {
        warn!("License signature accepted WITHOUT verification (stub verifier)");
        true
    }
}

/// Build the verifier selected by configuration.
pub fn verifier_from_config(
    kind: &LicenseVerifierKind,
) -> Result<Arc<dyn SignatureVerifier>, AuthwardenError> {
    match kind {
        LicenseVerifierKind::Ed25519 { public_key_hex } => Ok(Arc::new(
            Ed25519SignatureVerifier::from_public_key_hex(public_key_hex)?,
        )),
        LicenseVerifierKind::Stub => {
            warn!("Stub license verifier installed; any license block will pass");
            Ok(Arc::new(StubSignatureVerifier))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{license_block, LICENSE_PUBLIC_KEY_HEX};

    fn split(block: &str) -> (&str, &str) {
        block.split_once("||").unwrap()
    }

    #[test]
    fn valid_signature_verifies() {
        let verifier = Ed25519SignatureVerifier::from_public_key_hex(LICENSE_PUBLIC_KEY_HEX).unwrap();
        let block = license_block(r#"{"email":"a@b.c"}"#);
        let (sig, payload) = split(&block);
        assert!(verifier.verify_signature(sig, payload.as_bytes()));
    }

    #[test]
    fn altered_payload_fails() {
        let verifier = Ed25519SignatureVerifier::from_public_key_hex(LICENSE_PUBLIC_KEY_HEX).unwrap();
        let block = license_block(r#"{"email":"a@b.c"}"#);
        let (sig, _) = split(&block);
        assert!(!verifier.verify_signature(sig, br#"{"email":"x@b.c"}"#));
    }

    #[test]
    fn garbage_signatures_fail() {
        let verifier = Ed25519SignatureVerifier::from_public_key_hex(LICENSE_PUBLIC_KEY_HEX).unwrap();
        assert!(!verifier.verify_signature("not-valid-base64!!!", b"x"));
        assert!(!verifier.verify_signature("dGVzdA==", b"x"));
        assert!(!verifier.verify_signature(&STANDARD.encode([0u8; 64]), b"x"));
    }

    #[test]
    fn bad_public_keys_are_config_errors() {
        for key in ["not-valid-hex", "0000"] {
            assert!(matches!(
                Ed25519SignatureVerifier::from_public_key_hex(key),
                Err(AuthwardenError::ConfigError(_))
            ));
        }
    }

    #[test]
    fn stub_accepts_anything() {
        assert!(StubSignatureVerifier.verify_signature("", b""));
    }

    #[test]
    fn factory_follows_config() {
        let real = verifier_from_config(&LicenseVerifierKind::Ed25519 {
            public_key_hex: LICENSE_PUBLIC_KEY_HEX.to_string(),
        })
        .unwrap();
        assert!(!real.verify_signature("dGVzdA==", b"x"));

        let stub = verifier_from_config(&LicenseVerifierKind::Stub).unwrap();
        assert!(stub.verify_signature("dGVzdA==", b"x"));
    }
}
