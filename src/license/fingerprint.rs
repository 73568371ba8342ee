//! SHA-256 fingerprint of the licensed engine file.

use crate::AuthwardenError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Fingerprint the file at `path`.
pub fn fingerprint_file(path: &Path) -> Result<String, AuthwardenError> {
    let bytes = std::fs::read(path).map_err(|e| {
        AuthwardenError::LicenseIO(format!("Cannot read engine {}: {}", path.display(), e))
    })?;
    Ok(sha256_hex(&bytes))
}

/// Compare a computed fingerprint with the licensed one, ignoring hex case.
pub fn fingerprint_matches(actual: &str, expected: &str) -> bool {
    actual.trim().eq_ignore_ascii_case(expected.trim())
}
