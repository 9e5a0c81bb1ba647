// src/config/validation.rs

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

/// Upper bound for every duration setting: one year.
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig) -> Result<()> {
        debug!("Starting configuration validation");

        if let Err(e) = Self::validate_services(config) {
            warn!("Service validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_key_policy(config) {
            warn!("Key policy validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_resilience(config) {
            warn!("Resilience config validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_server_config(config) {
            warn!("Server config validation failed: {}", e);
            return Err(e);
        }

        debug!("Configuration validation completed successfully");
        Ok(())
    }

    fn validate_services(config: &AppConfig) -> Result<()> {
        let mut names = HashSet::new();

        for service in &config.services {
            if service.name.trim().is_empty() {
                return Err(AppError::config_validation(
                    "Service name cannot be empty",
                    Some("services.name"),
                ));
            }
            if !names.insert(service.name.as_str()) {
                return Err(AppError::config_validation(
                    format!("Duplicate service name: {}", service.name),
                    Some("services.name"),
                ));
            }
            // Zero credentials is a degraded mode, not a start-up failure.
            if service.all_keys().is_empty() {
                warn!(service = %service.name, "Service has no credentials configured");
            }
            if let Some(probe) = &service.probe {
                Url::parse(&probe.url).map_err(|e| {
                    AppError::config_validation(
                        format!(
                            "Invalid probe URL for service '{}': {} - {}",
                            service.name, probe.url, e
                        ),
                        Some("services.probe.url"),
                    )
                })?;
            }
        }

        debug!("Validated {} services", config.services.len());
        Ok(())
    }

    fn validate_key_policy(config: &AppConfig) -> Result<()> {
        let policy = &config.key_policy;
        if policy.failure_threshold == 0 {
            return Err(AppError::config_validation(
                "Failure threshold must be at least 1",
                Some("key_policy.failure_threshold"),
            ));
        }
        if policy.blacklist_duration_secs == 0 {
            return Err(AppError::config_validation(
                "Blacklist duration cannot be 0",
                Some("key_policy.blacklist_duration_secs"),
            ));
        }
        if policy.sweep_interval_secs == 0 {
            return Err(AppError::config_validation(
                "Sweep interval cannot be 0",
                Some("key_policy.sweep_interval_secs"),
            ));
        }
        Self::check_upper_bound(
            policy.blacklist_duration_secs,
            "key_policy.blacklist_duration_secs",
        )?;
        Self::check_upper_bound(policy.sweep_interval_secs, "key_policy.sweep_interval_secs")

    }

    fn validate_resilience(config: &AppConfig) -> Result<()> {
        let resilience = &config.resilience;
        if resilience.request_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Request timeout cannot be 0",
                Some("resilience.request_timeout_secs"),
            ));
        }
        if resilience.cache_max_entries == 0 {
            return Err(AppError::config_validation(
                "Cache must hold at least one entry",
                Some("resilience.cache_max_entries"),
            ));
        }
        let breaker = &resilience.circuit_breaker;
        if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
            return Err(AppError::config_validation(
                "Circuit breaker thresholds must be at least 1",
                Some("resilience.circuit_breaker"),
            ));
        }
        if config.probe_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Probe timeout cannot be 0",
                Some("probe_timeout_secs"),
            ));
        }
        Self::check_upper_bound(
            resilience.request_timeout_secs,
            "resilience.request_timeout_secs",
        )?;
        Self::check_upper_bound(resilience.cache_ttl_secs, "resilience.cache_ttl_secs")?;
        Self::check_upper_bound(
            breaker.recovery_timeout_secs,
            "resilience.circuit_breaker.recovery_timeout_secs",
        )?;
        Self::check_upper_bound(config.probe_timeout_secs, "probe_timeout_secs")
    }

    fn check_upper_bound(secs: u64, field: &str) -> Result<()> {
        if secs > MAX_DURATION_SECS {
            return Err(AppError::config_validation(
                format!("{field} must not exceed {MAX_DURATION_SECS} seconds, got {secs}"),
                Some(field),
            ));
        }
        Ok(())
    }

    fn validate_server_config(config: &AppConfig) -> Result<()> {
        // Port 0 lets the OS pick a free port, which only tests want.
        if config.server.port == 0 && !config.server.test_mode {
            return Err(AppError::config_validation(
                "Server port cannot be 0 (except in test mode)",
                Some("server.port"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProbeConfig, ServiceKeys};

    #[test]
    fn default_config_is_valid() {
        assert!(ConfigValidator::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn duplicate_service_names_rejected() {
        let config = AppConfig {
            services: vec![
                ServiceKeys::new("weather").with_primary("a"),
                ServiceKeys::new("weather").with_primary("b"),
            ],
            ..AppConfig::default()
        };
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn service_without_keys_is_allowed() {
        let config = AppConfig {
            services: vec![ServiceKeys::new("ai")],
            ..AppConfig::default()
        };
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn invalid_probe_url_rejected() {
        let mut service = ServiceKeys::new("weather").with_primary("a");
        service.probe = Some(ProbeConfig {
            url: "not a url".to_string(),
            query_param: None,
        });
        let config = AppConfig {
            services: vec![service],
            ..AppConfig::default()
        };
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn zero_threshold_rejected() {
        let mut config = AppConfig::default();
        config.key_policy.failure_threshold = 0;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn durations_beyond_one_year_rejected() {
        let mut config = AppConfig::default();
        config.resilience.circuit_breaker.recovery_timeout_secs = u64::MAX;
        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(err
            .to_string()
            .contains("resilience.circuit_breaker.recovery_timeout_secs"));

        let mut config = AppConfig::default();
        config.resilience.request_timeout_secs = MAX_DURATION_SECS + 1;
        assert!(ConfigValidator::validate(&config).is_err());

        let mut config = AppConfig::default();
        config.resilience.cache_ttl_secs = u64::MAX;
        assert!(ConfigValidator::validate(&config).is_err());

        let mut config = AppConfig::default();
        config.key_policy.blacklist_duration_secs = u64::MAX;
        assert!(ConfigValidator::validate(&config).is_err());

        let mut config = AppConfig::default();
        config.resilience.cache_ttl_secs = MAX_DURATION_SECS;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn port_zero_only_in_test_mode() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(ConfigValidator::validate(&config).is_err());
        config.server.test_mode = true;
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}
