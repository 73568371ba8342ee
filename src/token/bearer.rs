//! `Authorization: Bearer <token>` parsing.

use crate::AuthwardenError;

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively.
///
/// # Errors
/// * `HeaderMissing` - header absent or blank
/// * `HeaderMalformed` - not `<scheme> <value>`, scheme not `bearer`, or empty value
pub fn parse_bearer(header: Option<&str>) -> Result<&str, AuthwardenError> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(AuthwardenError::HeaderMissing)?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or(AuthwardenError::HeaderMalformed)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthwardenError::HeaderMalformed);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthwardenError::HeaderMalformed);
    }
    Ok(token)
}
