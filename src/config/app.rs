// src/config/app.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Credentials of one logical upstream service ("weather", "ai", ...).
#[derive(Debug, Deserialize, Clone, PartialEq, Serialize, Default)]
pub struct ServiceKeys {
    pub name: String,
    #[serde(default)]
    pub primary: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub probe: Option<ProbeConfig>,
}

impl ServiceKeys {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_primary(mut self, key: impl Into<String>) -> Self {
        self.primary = Some(key.into());
        self
    }

    pub fn with_alternative(mut self, key: impl Into<String>) -> Self {
        self.alternatives.push(key.into());
        self
    }

    /// Drops blank entries and duplicates. The primary wins over an equal
    /// alternative and earlier alternatives win over later ones.
    pub fn normalized(mut self) -> Self {
        self.primary = self
            .primary
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let mut seen: Vec<String> = self.primary.iter().cloned().collect();
        let mut alternatives = Vec::with_capacity(self.alternatives.len());
        for key in self.alternatives {
            let key = key.trim().to_string();
            if key.is_empty() || seen.contains(&key) {
                continue;
            }
            seen.push(key.clone());
            alternatives.push(key);
        }
        self.alternatives = alternatives;
        self
    }

    /// All credentials in selection order.
    pub fn all_keys(&self) -> Vec<String> {
        self.primary
            .iter()
            .chain(self.alternatives.iter())
            .cloned()
            .collect()
    }
}

/// Lightweight request used to check whether a credential is accepted.
///
/// Without `query_param` the key goes into an `Authorization: Bearer` header,
/// otherwise it is appended as that query parameter (`appid` for OpenWeather).
#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct ProbeConfig {
    pub url: String,
    #[serde(default)]
    pub query_param: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub admin_token: Option<String>,
    #[serde(default)]
    pub test_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_token: None,
            test_mode: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct KeyPolicyConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_blacklist_duration")]
    pub blacklist_duration_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for KeyPolicyConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            blacklist_duration_secs: default_blacklist_duration(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl KeyPolicyConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_cb_failure_threshold")]
    pub failure_threshold: usize,
    #[serde(default = "default_cb_recovery_timeout")]
    pub recovery_timeout_secs: u64,
    #[serde(default = "default_cb_success_threshold")]
    pub success_threshold: usize,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_cb_failure_threshold(),
            recovery_timeout_secs: default_cb_recovery_timeout(),
            success_threshold: default_cb_success_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            cache_ttl_secs: default_cache_ttl(),
            cache_max_entries: default_cache_max_entries(),
            circuit_breaker: CircuitBreakerSettings::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub key_policy: KeyPolicyConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default)]
    pub services: Vec<ServiceKeys>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            key_policy: KeyPolicyConfig::default(),
            resilience: ResilienceConfig::default(),
            probe_timeout_secs: default_probe_timeout(),
            services: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn service(&self, name: &str) -> Option<&ServiceKeys> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn total_keys(&self) -> usize {
        self.services.iter().map(|s| s.all_keys().len()).sum()
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_blacklist_duration() -> u64 {
    60 * 60
}

fn default_sweep_interval() -> u64 {
    10 * 60
}

fn default_request_timeout() -> u64 {
    10
}

fn default_cache_ttl() -> u64 {
    5 * 60
}

fn default_cache_max_entries() -> usize {
    1000
}

fn default_cb_failure_threshold() -> usize {
    5
}

fn default_cb_recovery_timeout() -> u64 {
    60
}

fn default_cb_success_threshold() -> usize {
    3
}

fn default_probe_timeout() -> u64 {
    5
}
