//! On-disk license block: `<base64 signature>||<json payload>`.

use crate::AuthwardenError;
use serde::{Deserialize, Serialize};

/// Separator between signature and payload.
pub const DELIMITER: &str = "||";

/// A license block split into its signature and raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseBlock {
    /// Base64 signature over `payload`.
    pub signature_b64: String,

    /// Payload exactly as signed, surrounding whitespace removed.
    pub payload: String,
}

/// Decoded license payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensePayload {
    /// Licensee email.
    pub email: String,

    /// Device the license is bound to.
    pub device_id: String,

    /// Issue timestamp as written by the signer.
    #[serde(default)]
    pub issued_at: String,

    /// Expected SHA-256 of the engine binary (hex).
    #[serde(default)]
    pub engine_hash: String,

    /// Whether the deployment must keep branding visible.
    #[serde(default)]
    pub branding_required: bool,
}

impl LicenseBlock {
    /// Split at the first `||`, trimming both halves.
    ///
    /// # Errors
    /// `LicenseTamperDetected` when the delimiter is absent or either half is empty.
    pub fn parse(raw: &str) -> Result<Self, AuthwardenError> {
        let (signature, payload) = raw
            .split_once(DELIMITER)
            .ok_or_else(|| AuthwardenError::tamper("invalid license structure (missing || delimiter)"))?;

        let signature_b64 = signature.trim();
        let payload = payload.trim();
        if signature_b64.is_empty() {
            return Err(AuthwardenError::tamper("license signature is empty"));
        }
        if payload.is_empty() {
            return Err(AuthwardenError::tamper("license payload is empty"));
        }

        Ok(Self {
            signature_b64: signature_b64.to_string(),
            payload: payload.to_string(),
        })
    }

    /// Decode the JSON payload.
    pub fn decode_payload(&self) -> Result<LicensePayload, AuthwardenError> {
        serde_json::from_str(&self.payload)
            .map_err(|e| AuthwardenError::tamper(format!("failed to parse license payload: {}", e)))
    }
}
