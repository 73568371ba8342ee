//! Bearer-token parsing and verification.

pub mod bearer;
pub mod expiry;
pub mod verifier;

pub use bearer::parse_bearer;
pub use verifier::TokenVerifier;
