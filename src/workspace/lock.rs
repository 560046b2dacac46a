//! Cooperative advisory lock for sessions.
//!
//! The lock is a record carried in session metadata, not an OS lock:
//! writers that ignore it can still corrupt state. Expiry is wall-clock
//! based so a crashed holder releases the session after the timeout.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Advisory lock record identifying the current writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLock {
    /// Caller-chosen owner token
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    /// Pid of the acquiring process, recorded for diagnostics
    pub pid: u32,
}

impl SessionLock {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            acquired_at: Utc::now(),
            pid: std::process::id(),
        }
    }

    /// Whether the lock has outlived the timeout.
    pub fn is_expired(&self, timeout_secs: u64) -> bool {
        let age = Utc::now().signed_duration_since(self.acquired_at);
        age > Duration::seconds(timeout_secs as i64)
    }

    pub fn held_by(&self, owner: &str) -> bool {
        self.owner == owner
    }
}
