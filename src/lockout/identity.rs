//! Login identity extraction from a buffered request body.

use crate::AuthwardenError;
use serde::Deserialize;

#[derive(Deserialize)]
struct LoginBody {
    #[serde(default)]
    username: Option<String>,
}

/// Read the `username` field of a JSON login body.
///
/// The body is only borrowed, so the caller can hand the same bytes to the
/// downstream handler. Returns `None` for non-JSON bodies, a missing field,
/// or a blank username. Surrounding whitespace is trimmed.
pub fn extract_login_identity(body: &[u8]) -> Option<String> {
    let parsed: LoginBody = serde_json::from_slice(body).ok()?;
    let username = parsed.username?;
    let username = username.trim();
    if username.is_empty() {
        None
    } else {
        Some(username.to_string())
    }
}

#[derive(Deserialize)]
struct PasswordBody {
    password: String,
}

/// Read the `password` field of a JSON login body.
pub fn extract_login_password(body: &[u8]) -> Result<String, AuthwardenError> {
    serde_json::from_slice::<PasswordBody>(body)
        .map(|parsed| parsed.password)
        .map_err(|e| AuthwardenError::MalformedLoginBody(e.to_string()))
}
