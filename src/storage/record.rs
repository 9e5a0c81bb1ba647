// src/storage/record.rs

use crate::config::ServiceKeys;
use crate::storage::KeyState;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Credential pool of one logical service together with its failure history.
#[derive(Debug, Clone, Default)]
pub struct KeyRecord {
    primary: Option<String>,
    alternatives: Vec<String>,
    states: HashMap<String, KeyState>,
    last_used_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    pub fn from_config(keys: &ServiceKeys) -> Self {
        Self {
            primary: keys.primary.clone(),
            alternatives: keys.alternatives.clone(),
            states: HashMap::new(),
            last_used_at: None,
        }
    }

    /// Primary first, then alternatives in configured order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.primary.iter().chain(self.alternatives.iter())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys().any(|k| k == key)
    }

    pub fn is_blacklisted(&self, key: &str) -> bool {
        self.states.get(key).is_some_and(|s| s.is_blocked)
    }

    pub fn state(&self, key: &str) -> Option<&KeyState> {
        self.states.get(key)
    }

    pub fn states(&self) -> impl Iterator<Item = (&String, &KeyState)> {
        self.states.iter()
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    /// Drops every failure record older than `window`. Returns how many
    /// blacklisted credentials were restored.
    pub fn expire_stale(&mut self, window: Duration, now: DateTime<Utc>) -> usize {
        let mut restored = 0;
        self.states.retain(|_, state| {
            if state.is_expired(window, now) {
                if state.is_blocked {
                    restored += 1;
                }
                false
            } else {
                true
            }
        });
        restored
    }

    /// Non-blacklisted primary, else the first non-blacklisted alternative,
    /// else the credential whose last failure is oldest.
    pub fn best_key(&self) -> Option<&String> {
        if let Some(key) = self.keys().find(|k| !self.is_blacklisted(k)) {
            return Some(key);
        }

        // All blacklisted. A missing timestamp sorts first; ties keep configured order.
        self.keys()
            .min_by_key(|k| self.states.get(*k).and_then(|s| s.last_failure))
    }

    /// First non-blacklisted credential other than `current`.
    pub fn next_key(&self, current: &str) -> Option<&String> {
        self.keys()
            .find(|k| k.as_str() != current && !self.is_blacklisted(k))
    }

    pub fn record_success(&mut self, key: &str, now: DateTime<Utc>) {
        self.states.remove(key);
        self.last_used_at = Some(now);
    }

    /// Returns the updated state and whether this failure blacklisted the key.
    pub fn record_failure(
        &mut self,
        key: &str,
        status: Option<u16>,
        max_failures: u32,
        now: DateTime<Utc>,
    ) -> (KeyState, bool) {
        let state = self.states.entry(key.to_string()).or_default();
        let newly_blocked = state.record_failure(status, max_failures, now);
        (state.clone(), newly_blocked)
    }

    pub fn reset(&mut self, key: &str) -> bool {
        self.states.remove(key).is_some()
    }
}
