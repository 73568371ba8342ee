//! Fire-and-forget audit events.
//!
//! Sinks must never block or fail the auth decision that produced the event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Event type names.
pub mod event {
    /// Successful login.
    pub const LOGIN: &str = "login";
    /// Rejected credentials.
    pub const LOGIN_FAILED: &str = "login_failed";
    /// Identity locked, or attempt rejected while locked.
    pub const LOGIN_LOCKED: &str = "login_locked";
    /// Bearer token rejected.
    pub const TOKEN_REJECTED: &str = "token_rejected";
    /// Token named an unknown key or a foreign issuer.
    pub const TOKEN_FORGERY_SUSPECTED: &str = "token_forgery_suspected";
    /// Request refused by the license gate.
    pub const LICENSE_DENIED: &str = "license_denied";
}

/// One security-relevant action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    /// Who, when known.
    pub identity: String,
    /// One of the [`event`] names.
    pub event_type: String,
    /// Peer address.
    pub source_address: String,
    /// Client user agent.
    pub user_agent: String,
    /// When it happened.
    pub at: DateTime<Utc>,
}

/// Receives audit events.
pub trait AuditSink: Send + Sync {
    /// Record `event`. Must return promptly.
    fn log_event(&self, event: AuditEvent);
}

/// Writes events to the `authwarden::audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_event(&self, event: AuditEvent) {
        info!(
            target: "authwarden::audit",
            identity = %event.identity,
            event_type = %event.event_type,
            source = %event.source_address,
            user_agent = %event.user_agent,
            at = %event.at.to_rfc3339(),
            "audit"
        );
    }
}

/// Hands events to a bounded channel, dropping them when it is full or closed.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::Sender<AuditEvent>,
}

impl ChannelAuditSink {
    /// Sink plus the receiver a storage task should drain.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl AuditSink for ChannelAuditSink {
    fn log_event(&self, event: AuditEvent) {
        if let Err(e) = self.sender.try_send(event) {
            let (reason, event) = match e {
                mpsc::error::TrySendError::Full(event) => ("full", event),
                mpsc::error::TrySendError::Closed(event) => ("closed", event),
            };
            warn!(
                reason,
                identity = %event.identity,
                event_type = %event.event_type,
                "Audit event dropped"
            );
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn log_event(&self, _event: AuditEvent) {}
}

/// Keeps the most recent events in memory for the trace endpoint.
#[derive(Debug)]
pub struct MemoryAuditSink {
    capacity: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Retain at most `capacity` events, oldest evicted first.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Retained events, newest first.
    pub fn recent(&self) -> Vec<AuditEvent> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.iter().rev().cloned().collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn log_event(&self, event: AuditEvent) {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    /// Fan out to `sinks`.
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanoutAuditSink {
    fn log_event(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.log_event(event.clone());
        }
    }
}
