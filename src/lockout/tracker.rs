//! Per-identity failure counting and lockout.
//!
//! Each identity moves through three states:
//! - Clear: no record
//! - Accumulating: failures counted inside the current window
//! - Locked: `max_failures` reached, rejected until `locked_until`
//!
//! Every operation takes the one table lock, does constant work, and
//! releases it. Nothing under the lock touches I/O.

use crate::clock::{to_chrono, Clock};
use crate::config::LockoutPolicy;
use crate::AuthwardenError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Failure record for one login identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    /// Failures counted in the current window.
    pub failure_count: u32,

    /// When the current window opened.
    pub window_start: DateTime<Utc>,

    /// Set once `failure_count` reaches the threshold.
    pub locked_until: Option<DateTime<Utc>>,
}

impl LoginAttempt {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            failure_count: 1,
            window_start: now,
            locked_until: None,
        }
    }

    fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }
}

/// Tracks login failures and lockouts for every identity seen.
pub struct LoginAttemptTracker {
    policy: LockoutPolicy,
    window: chrono::Duration,
    lockout: chrono::Duration,
    clock: Arc<dyn Clock>,
    attempts: Mutex<HashMap<String, LoginAttempt>>,
}

impl LoginAttemptTracker {
    /// Create an empty tracker.
    pub fn new(policy: LockoutPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            window: to_chrono(policy.window),
            lockout: to_chrono(policy.lockout),
            policy,
            clock,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Policy this tracker enforces.
    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, LoginAttempt>> {
        // Records stay consistent even if a holder panicked mid-operation.
        self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a failed login. Returns `true` when this failure triggered a lockout.
    ///
    /// A failure after the window elapsed, or after a lockout expired, starts a
    /// new window with a count of one. Failures while still locked are ignored
    /// and do not extend the lock.
    pub fn record_failure(&self, identity: &str) -> bool {
        let now = self.clock.now_utc();
        let mut table = self.table();

        let attempt = match table.get_mut(identity) {
            None => {
                table.insert(identity.to_string(), LoginAttempt::fresh(now));
                return self.lock_if_exhausted(identity, &mut table, now);
            }
            Some(attempt) => attempt,
        };

        if attempt.is_locked_at(now) {
            return false;
        }

        let lock_expired = attempt.locked_until.is_some();
        let window_elapsed = now.signed_duration_since(attempt.window_start) > self.window;
        if lock_expired || window_elapsed {
            *attempt = LoginAttempt::fresh(now);
        } else {
            attempt.failure_count = attempt.failure_count.saturating_add(1);
        }

        self.lock_if_exhausted(identity, &mut table, now)
    }

    fn lock_if_exhausted(
        &self,
        identity: &str,
        table: &mut HashMap<String, LoginAttempt>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(attempt) = table.get_mut(identity) else {
            return false;
        };
        if attempt.failure_count < self.policy.max_failures {
            debug!(identity = %identity, failures = attempt.failure_count, "Login failure recorded");
            return false;
        }
        let until = now.checked_add_signed(self.lockout).unwrap_or(DateTime::<Utc>::MAX_UTC);
        attempt.locked_until = Some(until);
        warn!(identity = %identity, until = %until.to_rfc3339(), "Login identity locked");
        true
    }

    /// Whether `identity` is currently locked.
    pub fn is_locked(&self, identity: &str) -> bool {
        let now = self.clock.now_utc();
        self.table()
            .get(identity)
            .is_some_and(|attempt| attempt.is_locked_at(now))
    }

    /// Whole seconds until `identity` may retry, rounded up.
    ///
    /// Returns the policy default when there is no record, and zero when a
    /// record exists but is not locked.
    pub fn retry_after_secs(&self, identity: &str) -> u64 {
        let now = self.clock.now_utc();
        match self.table().get(identity) {
            None => self.policy.default_retry_after.as_secs(),
            Some(attempt) => attempt
                .locked_until
                .map(|until| remaining_secs(until, now))
                .unwrap_or(0),
        }
    }

    /// Reject a locked identity with its retry delay.
    ///
    /// # Errors
    /// `RateLimited` while the identity is locked.
    pub fn check(&self, identity: &str) -> Result<(), AuthwardenError> {
        let now = self.clock.now_utc();
        let table = self.table();
        match table.get(identity) {
            Some(attempt) if attempt.is_locked_at(now) => {
                let retry_after_secs = attempt
                    .locked_until
                    .map(|until| remaining_secs(until, now))
                    .unwrap_or(0);
                Err(AuthwardenError::RateLimited { retry_after_secs })
            }
            _ => Ok(()),
        }
    }

    /// Forget `identity`. Calling it again is a no-op.
    pub fn clear(&self, identity: &str) {
        if self.table().remove(identity).is_some() {
            debug!(identity = %identity, "Login record cleared");
        }
    }

    /// Drop records whose window and lockout have both lapsed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_utc();
        let mut table = self.table();
        let before = table.len();
        table.retain(|_, attempt| {
            attempt.is_locked_at(now)
                || now.signed_duration_since(attempt.window_start) <= self.window
        });
        let removed = before - table.len();
        if removed > 0 {
            debug!(removed, remaining = table.len(), "Swept stale login records");
        }
        removed
    }

    /// Number of identities with a record.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Whether no identity has a record.
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Snapshot of the record for `identity`.
    pub fn attempt(&self, identity: &str) -> Option<LoginAttempt> {
        self.table().get(identity).cloned()
    }
}

fn remaining_secs(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = until.signed_duration_since(now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis as u64).div_ceil(1000)
    }
}
