//! # Authwarden
//!
//! **Request authentication and access control for HTTP services.**
//!
//! Authwarden sits in front of business handlers and decides whether a
//! request may proceed. It has three independent checks, composed by
//! [`AuthChain`]:
//!
//! - **Bearer tokens** are verified against a remotely published RSA key set
//!   (JWKS). The key id must exist in the set and the issuer must match the
//!   pinned issuer exactly.
//! - **Login lockout** counts failed logins per identity. Three failures in
//!   five minutes lock the identity for thirty minutes.
//! - **License gate** opens once at startup after an Ed25519-signed license
//!   block is validated, and never closes again within the process.
//!
//! ## Quickstart
//!
//! ```no_run
//! use authwarden::{AuthChain, AuthwardenConfig, LicenseBootstrap, LicenseGate, SystemClock};
//! use authwarden::audit::TracingAuditSink;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), authwarden::AuthwardenError> {
//!     let config = AuthwardenConfig::from_env()?;
//!     let clock = Arc::new(SystemClock);
//!
//!     let gate = Arc::new(LicenseGate::new());
//!     LicenseBootstrap::from_config(&config.license, clock.clone())?.run(&gate)?;
//!
//!     let chain = AuthChain::from_config(&config, gate, Arc::new(TracingAuditSink), clock)?;
//!     let claims = chain.authenticate(Some("Bearer eyJ..."), &Default::default())?;
//!     println!("hello {}", claims.preferred_username);
//!     Ok(())
//! }
//! ```
//!
//! ## Failure policy
//!
//! Every token failure is an authentication failure; nothing falls back to
//! anonymous access. An unreachable key-set endpoint denies the request.
//! Unknown key ids and issuer mismatches are additionally audited as
//! suspected forgeries. A license that fails validation leaves the gate in
//! `Fatal`, and the server binary exits before binding a socket.
//!
//! See [`AuthwardenConfig`] for configuration.

#![warn(missing_docs)]
#![doc(html_root_url = "https://docs.rs/authwarden/0.1.0")]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Protocol layer
pub mod protocol;

// Client layer
pub mod client;

// Key set and token verification
pub mod keyset;
pub mod token;

// Login lockout
pub mod lockout;

// License gate
pub mod license;

// Audit events
pub mod audit;

// Composition (main public API)
pub mod chain;

// Optional integrations
pub mod integrations;

#[cfg(test)]
mod testutil;

// Re-exports for public API
pub use chain::{AuthChain, RequestContext};
pub use clock::{Clock, SystemClock};
pub use config::{AuthwardenConfig, LockoutPolicy, TokenConfig};
pub use errors::AuthwardenError;
pub use keyset::{CachedKeySetResolver, KeySetResolver, RemoteKeySetResolver, StaticKeySetResolver};
pub use license::{LicenseBootstrap, LicenseGate};
pub use lockout::LoginAttemptTracker;
pub use protocol::models::{Claims, KeySet, SigningKey};
pub use token::TokenVerifier;

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
