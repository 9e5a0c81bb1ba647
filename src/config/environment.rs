//! Environment-based configuration management

use crate::config::ServiceKeys;
use serde::{Deserialize, Serialize};
use std::env;

/// Environment overrides for the server section of the file config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub admin_token: Option<String>,
    pub log_level: Option<String>,
}

impl EnvironmentConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server_host: lookup("FARMGUARD_HOST"),
            server_port: lookup("FARMGUARD_PORT").and_then(|s| s.parse().ok()),
            admin_token: lookup("FARMGUARD_ADMIN_TOKEN"),
            log_level: lookup("RUST_LOG"),
        }
    }

    pub fn has_overrides(&self) -> bool {
        self.server_host.is_some()
            || self.server_port.is_some()
            || self.admin_token.is_some()
            || self.log_level.is_some()
    }

    pub fn override_summary(&self) -> Vec<String> {
        let mut overrides = Vec::new();

        if self.server_host.is_some() {
            overrides.push("FARMGUARD_HOST".to_string());
        }
        if self.server_port.is_some() {
            overrides.push("FARMGUARD_PORT".to_string());
        }
        if self.admin_token.is_some() {
            overrides.push("FARMGUARD_ADMIN_TOKEN".to_string());
        }
        if self.log_level.is_some() {
            overrides.push("RUST_LOG".to_string());
        }

        overrides
    }
}

/// Load per-service credentials from the process environment.
pub fn load_service_keys_from_env() -> Vec<ServiceKeys> {
    load_service_keys_from(|name| env::var(name).ok())
}

/// Reads the weather and AI credential variables through `lookup`.
///
/// Weather: primary `WEATHER_API_KEY`, comma-separated alternatives in
/// `WEATHER_API_KEYS`, plus a WeatherAPI.com key in `WEATHERAPI_KEY`.
/// AI: primary `OPENAI_API_KEY`, alternative `COHERE_API_KEY`.
/// Every variable also accepts a `NEXT_PUBLIC_` prefixed fallback.
/// Services with no credentials at all are omitted.
pub fn load_service_keys_from(lookup: impl Fn(&str) -> Option<String>) -> Vec<ServiceKeys> {
    let var = |name: &str| {
        lookup(name)
            .or_else(|| lookup(&format!("NEXT_PUBLIC_{name}")))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let mut weather = ServiceKeys::new("weather");
    weather.primary = var("WEATHER_API_KEY");
    if let Some(list) = var("WEATHER_API_KEYS") {
        weather.alternatives.extend(split_key_list(&list));
    }
    if let Some(key) = var("WEATHERAPI_KEY") {
        weather.alternatives.push(key);
    }

    let mut ai = ServiceKeys::new("ai");
    ai.primary = var("OPENAI_API_KEY");
    if let Some(key) = var("COHERE_API_KEY") {
        ai.alternatives.push(key);
    }

    [weather, ai]
        .into_iter()
        .map(ServiceKeys::normalized)
        .filter(|s| !s.all_keys().is_empty())
        .collect()
}

fn split_key_list(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
