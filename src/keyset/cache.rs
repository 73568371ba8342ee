//! Caching key-set resolver.
//!
//! Wraps any [`KeySetResolver`] with:
//! - a TTL on the last good snapshot
//! - negative caching of fetch failures
//! - single-flight fetching (concurrent misses wait for one fetch)
//! - a rate-limited forced refresh when a token names an unknown kid

use crate::clock::{to_chrono, Clock};
use crate::config::TokenConfig;
use crate::keyset::resolver::KeySetResolver;
use crate::protocol::models::{KeySet, SigningKey};
use crate::AuthwardenError;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

struct Snapshot {
    keys: Arc<KeySet>,
    fetched_at: DateTime<Utc>,
}

struct Failure {
    message: String,
    failed_at: DateTime<Utc>,
}

#[derive(Default)]
struct CacheState {
    snapshot: Option<Snapshot>,
    failure: Option<Failure>,
}

/// TTL cache in front of another resolver.
pub struct CachedKeySetResolver<R> {
    inner: R,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    negative_ttl: chrono::Duration,
    min_refresh_interval: chrono::Duration,
    state: Mutex<CacheState>,
    in_flight: Mutex<()>,
}

impl<R: KeySetResolver> CachedKeySetResolver<R> {
    /// Cache `inner` with the TTLs from `config`.
    pub fn new(inner: R, config: &TokenConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttls(
            inner,
            clock,
            config.key_set_ttl,
            config.negative_ttl,
            config.min_refresh_interval,
        )
    }

    /// Cache `inner` with explicit TTLs.
    pub fn with_ttls(
        inner: R,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        negative_ttl: Duration,
        min_refresh_interval: Duration,
    ) -> Self {
        Self {
            inner,
            clock,
            ttl: to_chrono(ttl),
            negative_ttl: to_chrono(negative_ttl),
            min_refresh_interval: to_chrono(min_refresh_interval),
            state: Mutex::new(CacheState::default()),
            in_flight: Mutex::new(()),
        }
    }

    /// Drop the cached snapshot and any remembered failure.
    pub fn invalidate(&self) {
        *self.state() = CacheState::default();
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh snapshot, remembered failure, or nothing.
    fn cached(&self, now: DateTime<Utc>) -> Result<Option<Arc<KeySet>>, AuthwardenError> {
        let state = self.state();
        if let Some(snapshot) = &state.snapshot {
            if now - snapshot.fetched_at < self.ttl {
                return Ok(Some(snapshot.keys.clone()));
            }
        }
        if let Some(failure) = &state.failure {
            if now - failure.failed_at < self.negative_ttl {
                return Err(AuthwardenError::KeySetFetch(failure.message.clone()));
            }
        }
        Ok(None)
    }

    fn fetch(&self) -> Result<Arc<KeySet>, AuthwardenError> {
        let result = self.inner.resolve();
        let now = self.clock.now_utc();
        let mut state = self.state();
        match &result {
            Ok(keys) => {
                debug!(keys = keys.len(), "Key set cached");
                state.snapshot = Some(Snapshot {
                    keys: keys.clone(),
                    fetched_at: now,
                });
                state.failure = None;
            }
            Err(e) => {
                warn!(error = %e, "Key set fetch failed");
                state.failure = Some(Failure {
                    message: match e {
                        AuthwardenError::KeySetFetch(message) => message.clone(),
                        other => other.to_string(),
                    },
                    failed_at: now,
                });
            }
        }
        result
    }

    /// Refetch unless another caller refreshed within `min_refresh_interval`.
    fn refresh(&self) -> Result<Arc<KeySet>, AuthwardenError> {
        let _flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now_utc();
        if let Some(snapshot) = &self.state().snapshot {
            if now - snapshot.fetched_at < self.min_refresh_interval {
                return Ok(snapshot.keys.clone());
            }
        }
        self.fetch()
    }
}

impl<R: KeySetResolver> KeySetResolver for CachedKeySetResolver<R> {
    fn resolve(&self) -> Result<Arc<KeySet>, AuthwardenError> {
        if let Some(keys) = self.cached(self.clock.now_utc())? {
            return Ok(keys);
        }

        let _flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have completed the fetch while we waited.
        if let Some(keys) = self.cached(self.clock.now_utc())? {
            return Ok(keys);
        }
        self.fetch()
    }

    fn lookup(&self, kid: &str) -> Result<Option<SigningKey>, AuthwardenError> {
        let keys = self.resolve()?;
        if let Some(key) = keys.get(kid) {
            return Ok(Some(key.clone()));
        }

        debug!(kid = %kid, "Unknown kid, refreshing key set");
        Ok(self.refresh()?.get(kid).cloned())
    }
}
