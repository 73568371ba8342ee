//! License block validation and the process-wide unlock gate.

pub mod block;
pub mod bootstrap;
pub mod fingerprint;
pub mod gate;
pub mod signature;

pub use block::{LicenseBlock, LicensePayload};
pub use bootstrap::{wait_for_license_file, LicenseBootstrap};
pub use gate::{GatePhase, LicenseGate, UnlockStatus};
pub use signature::{
    verifier_from_config, Ed25519SignatureVerifier, SignatureVerifier, StubSignatureVerifier,
};
