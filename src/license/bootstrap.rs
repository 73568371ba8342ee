//! Startup license validation.
//!
//! Runs once before any traffic is served. Any failure leaves the gate in
//! `Fatal` and the caller is expected to exit.

use crate::clock::Clock;
use crate::config::LicenseConfig;
use crate::license::block::{LicenseBlock, LicensePayload};
use crate::license::fingerprint::{fingerprint_file, fingerprint_matches};
use crate::license::gate::LicenseGate;
use crate::license::signature::{verifier_from_config, SignatureVerifier};
use crate::AuthwardenError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Validates the on-disk license and opens the gate.
pub struct LicenseBootstrap {
    path: PathBuf,
    verifier: Arc<dyn SignatureVerifier>,
    device_id: String,
    allow_multi_device: bool,
    engine_path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl LicenseBootstrap {
    /// Bootstrap with an explicit verifier.
    pub fn new(
        config: &LicenseConfig,
        verifier: Arc<dyn SignatureVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            path: config.path.clone(),
            verifier,
            device_id: config.device_id.clone(),
            allow_multi_device: config.allow_multi_device,
            engine_path: config.engine_path.clone(),
            clock,
        }
    }

    /// Bootstrap with the verifier selected by `config.verifier`.
    pub fn from_config(config: &LicenseConfig, clock: Arc<dyn Clock>) -> Result<Self, AuthwardenError> {
        let verifier = verifier_from_config(&config.verifier)?;
        Ok(Self::new(config, verifier, clock))
    }

    /// Drive `gate` from `Uninitialized` to `Valid` or `Fatal`.
    ///
    /// # Errors
    /// - `LicenseIO` - license (or engine) file unreadable
    /// - `LicenseTamperDetected` - bad structure, signature, payload, fingerprint, or device
    /// - `Internal` - the gate was already bootstrapped
    pub fn run(&self, gate: &LicenseGate) -> Result<LicensePayload, AuthwardenError> {
        if !gate.begin_validation() {
            return Err(AuthwardenError::Internal(format!(
                "License gate already in {:?}",
                gate.phase()
            )));
        }

        match self.validate() {
            Ok(payload) => {
                gate.mark_valid(self.clock.now_utc(), payload.clone());
                info!(
                    email = %payload.email,
                    device_id = %payload.device_id,
                    branding_required = payload.branding_required,
                    "License validated"
                );
                Ok(payload)
            }
            Err(e) => {
                gate.mark_fatal();
                error!(path = %self.path.display(), error = %e, "License validation failed");
                Err(e)
            }
        }
    }

    fn validate(&self) -> Result<LicensePayload, AuthwardenError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            AuthwardenError::LicenseIO(format!("Cannot read {}: {}", self.path.display(), e))
        })?;

        let block = LicenseBlock::parse(&raw)?;

        if !self
            .verifier
            .verify_signature(&block.signature_b64, block.payload.as_bytes())
        {
            return Err(AuthwardenError::tamper("license signature verification failed"));
        }

        let payload = block.decode_payload()?;

        if let Some(engine) = &self.engine_path {
            let actual = fingerprint_file(engine)?;
            if !fingerprint_matches(&actual, &payload.engine_hash) {
                return Err(AuthwardenError::tamper(format!(
                    "engine fingerprint mismatch (licensed {}, running {})",
                    payload.engine_hash, actual
                )));
            }
        }

        if self.allow_multi_device {
            warn!("Device binding check disabled (multi-device mode)");
        } else if payload.device_id != self.device_id {
            return Err(AuthwardenError::tamper(format!(
                "device mismatch: license bound to '{}', current is '{}'",
                payload.device_id, self.device_id
            )));
        }

        Ok(payload)
    }
}

/// Poll until `path` exists. Returns whether it appeared within `attempts` checks.
pub fn wait_for_license_file(path: &Path, attempts: u32, interval: Duration) -> bool {
    for attempt in 1..=attempts.max(1) {
        if path.exists() {
            return true;
        }
        info!(path = %path.display(), attempt, attempts, "Waiting for license file");
        if attempt < attempts {
            std::thread::sleep(interval);
        }
    }
    path.exists()
}
