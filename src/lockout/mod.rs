//! Brute-force protection for the login path.

pub mod identity;
pub mod tracker;

pub use identity::{extract_login_identity, extract_login_password};
pub use tracker::{LoginAttempt, LoginAttemptTracker};
