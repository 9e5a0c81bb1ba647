// src/storage/key_state.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Status codes that prove the credential itself is rejected.
pub const IMMEDIATE_BLACKLIST_STATUSES: [u16; 3] = [401, 403, 429];

pub fn is_immediate_blacklist_status(status: Option<u16>) -> bool {
    status.is_some_and(|code| IMMEDIATE_BLACKLIST_STATUSES.contains(&code))
}

/// Failure bookkeeping for a single credential.
///
/// `HEALTHY` is the default state, `DEGRADED` means failures below the
/// threshold and `BLACKLISTED` means `is_blocked`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct KeyState {
    pub is_blocked: bool,
    pub consecutive_failures: u32,
    pub last_failure: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyHealth {
    Healthy,
    Degraded,
    Blacklisted,
}

impl KeyState {
    pub fn should_block(&self, max_failures: u32, status: Option<u16>) -> bool {
        is_immediate_blacklist_status(status) || self.consecutive_failures >= max_failures
    }

    /// Record one failure at `now`. Returns `true` when this failure moved the
    /// key into the blacklist.
    pub fn record_failure(&mut self, status: Option<u16>, max_failures: u32, now: DateTime<Utc>) -> bool {
        let was_blocked = self.is_blocked;
        self.consecutive_failures += 1;
        self.last_failure = Some(now);

        if self.should_block(max_failures, status) {
            self.is_blocked = true;
        }
        self.is_blocked && !was_blocked
    }

    /// The last failure is older than `window`, so the record no longer counts.
    pub fn is_expired(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.last_failure.map_or(true, |at| now - at > window)
    }

    pub fn health(&self) -> KeyHealth {
        if self.is_blocked {
            KeyHealth::Blacklisted
        } else if self.consecutive_failures > 0 {
            KeyHealth::Degraded
        } else {
            KeyHealth::Healthy
        }
    }
}
