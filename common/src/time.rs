//! Time utilities for FxGate.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// A timestamp with timezone (always UTC for FxGate).
pub type Timestamp = DateTime<Utc>;

/// Default time-to-live for cached rate snapshots (60 seconds).
pub fn default_rate_ttl() -> StdDuration {
    StdDuration::from_secs(60)
}

/// Default time-to-live for the cached currency catalog (48 hours).
pub fn default_catalog_ttl() -> StdDuration {
    StdDuration::from_secs(172_800)
}

/// Port for obtaining current time.
///
/// Stores and the limiter read time through this so tests can drive expiry and
/// leakage deterministically.
pub trait Clock: Send + Sync + Debug {
    /// Get the current time.
    fn now(&self) -> Timestamp;

    /// Current time in whole epoch seconds.
    fn epoch_seconds(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually driven clock for tests.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<Timestamp>>,
}

impl MockClock {
    /// Create a mock clock starting at a specific time.
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Start at a whole epoch second.
    pub fn at_epoch(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, by: Duration) {
        *self.current.lock() += by;
    }

    /// Set the clock to a specific time.
    pub fn set(&self, at: Timestamp) {
        *self.current.lock() = at;
    }
}

impl Clock for MockClock {
    fn now(&self) -> Timestamp {
        *self.current.lock()
    }
}

/// Whole seconds for store TTLs, never below one.
pub fn ttl_seconds(ttl: StdDuration) -> u64 {
    ttl.as_secs().max(1)
}

/// Time after `now` at which an entry with `ttl` expires.
pub fn expires_at(now: Timestamp, ttl: StdDuration) -> Timestamp {
    Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
