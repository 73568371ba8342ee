//! Token time-claim enforcement against the injected clock.

use crate::clock::Clock;
use crate::AuthwardenError;

/// Check `exp` and `nbf` (seconds since the epoch) with a skew allowance.
///
/// # Errors
/// * `TokenExpired` - `exp` is at or before `now - leeway`
/// * `TokenNotYetValid` - `nbf` is after `now + leeway`
pub fn check_token_times<C: Clock + ?Sized>(
    exp: i64,
    nbf: Option<i64>,
    leeway: chrono::Duration,
    clock: &C,
) -> Result<(), AuthwardenError> {
    let now = clock.now_utc().timestamp();
    let leeway = leeway.num_seconds().max(0);

    if exp.saturating_add(leeway) <= now {
        return Err(AuthwardenError::TokenExpired);
    }

    if let Some(nbf) = nbf {
        if nbf.saturating_sub(leeway) > now {
            return Err(AuthwardenError::TokenNotYetValid);
        }
    }

    Ok(())
}
