// src/key_manager.rs

use crate::config::{AppConfig, ServiceKeys};
use crate::storage::{KeyHealth, KeyRecord};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, instrument, warn};

/// Failure policy applied to every credential.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPolicy {
    /// Non-auth failures needed to blacklist a credential.
    pub failure_threshold: u32,
    /// How long a failure record (and a blacklisting) stays in force.
    pub blacklist_duration: Duration,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            blacklist_duration: Duration::hours(1),
        }
    }
}

impl KeyPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            failure_threshold: config.key_policy.failure_threshold,
            blacklist_duration: Duration::seconds(
                i64::try_from(config.key_policy.blacklist_duration_secs)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1000),
            ),
        }
    }
}

/// Diagnostics for one service. Credentials only ever appear masked.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub total_keys: usize,
    pub available_keys: usize,
    pub blacklisted_keys: usize,
    pub has_working_key: bool,
    pub last_used: Option<String>,
    /// Credentials with a failure on record, in configured order.
    pub failures: Vec<KeyFailure>,
    pub keys: Vec<MaskedKeyStatus>,
}

/// Last failure of one credential. `index` is its position in the pool, so
/// entries stay distinct even when two credentials mask identically.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeyFailure {
    pub index: usize,
    pub key: String,
    pub failed_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MaskedKeyStatus {
    pub index: usize,
    pub key: String,
    pub health: KeyHealth,
    pub consecutive_failures: u32,
}

/// Owns the credential pools of all services and picks the credential to use
/// for the next call, learning from reported outcomes.
///
/// All state sits behind one mutex so that each report is a single atomic
/// read-modify-write. The lock is never held across an `.await`.
#[derive(Debug)]
pub struct KeyManager {
    records: Mutex<HashMap<String, KeyRecord>>,
    policy: KeyPolicy,
}

impl KeyManager {
    #[instrument(skip(services), name = "key_manager_init")]
    pub fn new(services: &[ServiceKeys], policy: KeyPolicy) -> Self {
        let records = Self::build_records(services);
        info!(
            services = records.len(),
            total_keys = records.values().map(|r| r.keys().count()).sum::<usize>(),
            failure_threshold = policy.failure_threshold,
            blacklist_secs = policy.blacklist_duration.num_seconds(),
            "KeyManager initialized"
        );
        Self {
            records: Mutex::new(records),
            policy,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.services, KeyPolicy::from_config(config))
    }

    fn build_records(services: &[ServiceKeys]) -> HashMap<String, KeyRecord> {
        services
            .iter()
            .map(|s| (s.name.clone(), KeyRecord::from_config(&s.clone().normalized())))
            .collect()
    }

    /// Replace every pool with a fresh configuration. All failure history is dropped.
    pub fn reload(&self, services: &[ServiceKeys]) {
        let records = Self::build_records(services);
        info!(services = records.len(), "Reloading API key configuration");
        *self.records.lock() = records;
    }

    /// Best credential for `service`: primary if usable, then the first usable
    /// alternative, then (all blacklisted) the one whose failure is oldest.
    ///
    /// `None` only when the service is unknown or has no credentials.
    pub fn get_best_key(&self, service: &str) -> Option<String> {
        self.with_record(service, |record| record.best_key().cloned())
            .flatten()
    }

    /// First non-blacklisted credential other than `current`. Unlike
    /// [`get_best_key`](Self::get_best_key) this never returns a blacklisted one.
    pub fn get_next_key(&self, service: &str, current: &str) -> Option<String> {
        self.with_record(service, |record| record.next_key(current).cloned())
            .flatten()
    }

    /// `true` when the best credential is not blacklisted.
    pub fn has_available_keys(&self, service: &str) -> bool {
        self.with_record(service, |record| {
            record
                .best_key()
                .is_some_and(|key| !record.is_blacklisted(key))
        })
        .unwrap_or(false)
    }

    pub fn is_blacklisted(&self, service: &str, key: &str) -> bool {
        self.with_record(service, |record| record.is_blacklisted(key))
            .unwrap_or(false)
    }

    pub fn failure_count(&self, service: &str, key: &str) -> u32 {
        self.with_record(service, |record| {
            record.state(key).map_or(0, |s| s.consecutive_failures)
        })
        .unwrap_or(0)
    }

    #[instrument(level = "debug", skip(self, key), fields(api_key.preview = %mask_key(key)))]
    pub fn report_success(&self, service: &str, key: &str) {
        let now = Utc::now();
        let mut records = self.records.lock();
        let Some(record) = records.get_mut(service) else {
            warn!(service, "Success reported for unknown service");
            return;
        };
        if !record.contains(key) {
            warn!(service, "Success reported for a credential that is not configured");
            return;
        }
        record.record_success(key, now);
        debug!(service, "API key success reported");
    }

    /// Count a failure. 401/403/429 blacklist at once; anything else counts
    /// towards the failure threshold.
    pub fn report_failure(&self, service: &str, key: &str, status: Option<u16>) {
        let now = Utc::now();
        let mut records = self.records.lock();
        let Some(record) = records.get_mut(service) else {
            warn!(service, "Failure reported for unknown service");
            return;
        };
        if !record.contains(key) {
            warn!(service, "Failure reported for a credential that is not configured");
            return;
        }

        // A stale record must not count towards a fresh blacklisting.
        record.expire_stale(self.policy.blacklist_duration, now);
        let (state, newly_blocked) =
            record.record_failure(key, status, self.policy.failure_threshold, now);
        if newly_blocked {
            warn!(
                service,
                api_key.preview = %mask_key(key),
                status = ?status,
                failures = state.consecutive_failures,
                "API key blacklisted"
            );
        } else {
            warn!(
                service,
                api_key.preview = %mask_key(key),
                status = ?status,
                failures = state.consecutive_failures,
                threshold = self.policy.failure_threshold,
                "API key failure recorded"
            );
        }
    }

    /// Manually clear a credential's failure history. Returns `false` when the
    /// service or credential is not configured.
    pub fn reset_key(&self, service: &str, key: &str) -> bool {
        let mut records = self.records.lock();
        match records.get_mut(service) {
            Some(record) if record.contains(key) => {
                record.reset(key);
                info!(service, api_key.preview = %mask_key(key), "API key manually reset");
                true
            }
            _ => false,
        }
    }

    /// Remove failure and blacklist entries older than the blacklist duration
    /// across every service. Returns how many credentials were restored.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.records.lock();
        let restored: usize = records
            .values_mut()
            .map(|record| record.expire_stale(self.policy.blacklist_duration, now))
            .sum();
        if restored > 0 {
            info!(restored, "Expired blacklist entries removed");
        } else {
            debug!("Blacklist sweep found nothing to expire");
        }
        restored
    }

    /// Masked form of the credential [`get_best_key`](Self::get_best_key) would return.
    pub fn masked_key(&self, service: &str) -> Option<String> {
        self.get_best_key(service).map(|k| mask_key(&k))
    }

    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// All configured credentials of a service in selection order.
    pub fn credentials(&self, service: &str) -> Vec<String> {
        self.with_record(service, |record| record.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn status(&self) -> BTreeMap<String, ServiceStatus> {
        let now = Utc::now();
        let mut records = self.records.lock();
        records
            .iter_mut()
            .map(|(service, record)| {
                record.expire_stale(self.policy.blacklist_duration, now);

                let keys: Vec<MaskedKeyStatus> = record
                    .keys()
                    .enumerate()
                    .map(|(index, k)| {
                        let state = record.state(k).cloned().unwrap_or_default();
                        MaskedKeyStatus {
                            index,
                            key: mask_key(k),
                            health: state.health(),
                            consecutive_failures: state.consecutive_failures,
                        }
                    })
                    .collect();
                let blacklisted = keys
                    .iter()
                    .filter(|k| k.health == KeyHealth::Blacklisted)
                    .count();
                let failures = record
                    .keys()
                    .enumerate()
                    .filter_map(|(index, k)| {
                        let at = record.state(k)?.last_failure?;
                        Some(KeyFailure {
                            index,
                            key: mask_key(k),
                            failed_at: at.to_rfc3339(),
                        })
                    })
                    .collect();

                let status = ServiceStatus {
                    total_keys: keys.len(),
                    available_keys: keys.len() - blacklisted,
                    blacklisted_keys: blacklisted,
                    has_working_key: keys.len() > blacklisted,
                    last_used: record.last_used_at().map(|at| at.to_rfc3339()),
                    failures,
                    keys,
                };
                (service.clone(), status)
            })
            .collect()
    }

    /// Failure records currently held, without applying lazy expiry.
    #[cfg(test)]
    pub(crate) fn tracked_states(&self) -> usize {
        self.records.lock().values().map(|r| r.states().count()).sum()
    }

    /// Runs `f` on the service's record after dropping expired failure state.
    fn with_record<R>(&self, service: &str, f: impl FnOnce(&KeyRecord) -> R) -> Option<R> {
        let mut records = self.records.lock();
        match records.get_mut(service) {
            Some(record) => {
                record.expire_stale(self.policy.blacklist_duration, Utc::now());
                Some(f(record))
            }
            None => {
                warn!(service, "No configuration found for service");
                None
            }
        }
    }
}

/// First four and last four characters with the middle starred out.
/// Keys of eight characters or fewer are masked completely.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 8))
}
