//! Process-wide license gate.
//!
//! The gate moves one way: `Uninitialized -> Validating -> {Valid, Fatal}`.
//! `admit()` is one atomic load and never takes a lock.

use crate::clock::Clock;
use crate::license::block::LicensePayload;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};

/// Informational validity reported alongside an unlock.
pub const REPORTED_VALIDITY_DAYS: i64 = 90;

/// Bootstrap phase of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePhase {
    /// Nothing has run yet.
    Uninitialized,
    /// Bootstrap is reading and checking the license.
    Validating,
    /// License accepted; gated routes are open.
    Valid,
    /// License rejected; the process must stop serving.
    Fatal,
}

impl GatePhase {
    fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Validating => 1,
            Self::Valid => 2,
            Self::Fatal => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Validating,
            2 => Self::Valid,
            3 => Self::Fatal,
            _ => Self::Uninitialized,
        }
    }
}

#[derive(Debug, Clone)]
struct Unlock {
    at: DateTime<Utc>,
    payload: LicensePayload,
}

/// Snapshot served by the unlock-status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UnlockStatus {
    /// Whether gated routes are open.
    pub unlocked: bool,
    /// Current bootstrap phase.
    pub phase: GatePhase,
    /// When the unlock happened.
    pub unlocked_at: Option<DateTime<Utc>>,
    /// Informational end of validity; not enforced by the gate.
    pub expires_at: Option<DateTime<Utc>>,
    /// Server clock at report time.
    pub server_time: DateTime<Utc>,
    /// Licensee email.
    pub email: Option<String>,
    /// Licensed device.
    pub device_id: Option<String>,
    /// Branding requirement from the license.
    pub branding_required: bool,
}

/// One-shot admission gate for license-protected routes.
#[derive(Debug)]
pub struct LicenseGate {
    phase: AtomicU8,
    unlock: OnceCell<Unlock>,
}

impl Default for LicenseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LicenseGate {
    /// A closed gate in `Uninitialized`.
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(GatePhase::Uninitialized.as_u8()),
            unlock: OnceCell::new(),
        }
    }

    /// `true` once bootstrap reached `Valid`; never reverts.
    pub fn admit(&self) -> bool {
        self.phase() == GatePhase::Valid
    }

    /// Current phase.
    pub fn phase(&self) -> GatePhase {
        GatePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn transition(&self, from: GatePhase, to: GatePhase) -> bool {
        self.phase
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Uninitialized -> Validating`. Fails if bootstrap already started.
    pub(crate) fn begin_validation(&self) -> bool {
        self.transition(GatePhase::Uninitialized, GatePhase::Validating)
    }

    /// `Validating -> Valid`, recording the unlock.
    pub(crate) fn mark_valid(&self, at: DateTime<Utc>, payload: LicensePayload) -> bool {
        // Published before the phase flips so `admit() == true` implies status data.
        let _ = self.unlock.set(Unlock { at, payload });
        self.transition(GatePhase::Validating, GatePhase::Valid)
    }

    /// `Validating -> Fatal`.
    pub(crate) fn mark_fatal(&self) -> bool {
        self.transition(GatePhase::Validating, GatePhase::Fatal)
    }

    /// Report the current unlock state.
    pub fn status(&self, clock: &dyn Clock) -> UnlockStatus {
        let phase = self.phase();
        let unlock = if phase == GatePhase::Valid {
            self.unlock.get()
        } else {
            None
        };

        UnlockStatus {
            unlocked: phase == GatePhase::Valid,
            phase,
            unlocked_at: unlock.map(|u| u.at),
            expires_at: unlock.and_then(|u| u.at.checked_add_signed(Duration::days(REPORTED_VALIDITY_DAYS))),
            server_time: clock.now_utc(),
            email: unlock.map(|u| u.payload.email.clone()),
            device_id: unlock.map(|u| u.payload.device_id.clone()),
            branding_required: unlock.is_some_and(|u| u.payload.branding_required),
        }
    }

    /// A gate already in `Valid`, for tests and embedding without a license file.
    #[cfg(any(test, feature = "test-seams"))]
    pub fn unlocked(at: DateTime<Utc>, payload: LicensePayload) -> Self {
        let gate = Self::new();
        gate.begin_validation();
        gate.mark_valid(at, payload);
        gate
    }
}
