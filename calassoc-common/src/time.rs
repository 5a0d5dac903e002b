//! Time utilities
//!
//! All instants handled by the engine are UTC. Timestamps persisted to SQLite
//! use a fixed-width text form so that lexical comparison in SQL matches
//! temporal order.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::sync::Mutex;

/// Storage format: always 27 characters, microsecond precision
const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const STORAGE_WIDTH: usize = 27;

/// Source of "now" for queue bookkeeping
///
/// Passed explicitly to the queue and reaper so tests can control time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `delta`
    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += delta;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Encode a UTC instant in the fixed-width storage form
pub fn format_utc(instant: &DateTime<Utc>) -> String {
    instant.format(STORAGE_FORMAT).to_string()
}

/// Decode a stored timestamp
///
/// Only the fixed-width storage form is accepted. Offsets or other precisions
/// would break lexical ordering in SQL, so they are rejected instead of being
/// normalised on read.
pub fn parse_utc(text: &str) -> Result<DateTime<Utc>> {
    if text.len() != STORAGE_WIDTH {
        return Err(Error::InvalidInput(format!(
            "Invalid UTC timestamp '{}': expected YYYY-MM-DDTHH:MM:SS.ffffffZ",
            text
        )));
    }
    NaiveDateTime::parse_from_str(text, STORAGE_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| Error::InvalidInput(format!("Invalid UTC timestamp '{}': {}", text, e)))
}
