//! Common test utilities and fixtures

#![allow(dead_code)]

use farmguard_gateway::{
    config::{AppConfig, ServiceKeys},
    resilience::{CircuitBreakerConfig, ResponseCache},
    KeyManager, KeyPolicy, ResilienceWrapper,
};
use std::sync::Arc;
use std::time::Duration;

pub const WEATHER_PRIMARY: &str = "weather-primary-key-0001";
pub const WEATHER_BACKUP: &str = "weather-backup-key-0002";
pub const WEATHER_SPARE: &str = "weather-spare-key-0003";
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Weather with a primary and two alternatives, plus an AI service with a
/// single key.
pub fn default_services() -> Vec<ServiceKeys> {
    vec![
        ServiceKeys::new("weather")
            .with_primary(WEATHER_PRIMARY)
            .with_alternative(WEATHER_BACKUP)
            .with_alternative(WEATHER_SPARE),
        ServiceKeys::new("ai").with_primary("sk-openai-test-key-1234"),
    ]
}

pub fn key_manager(services: &[ServiceKeys]) -> Arc<KeyManager> {
    Arc::new(KeyManager::new(services, KeyPolicy::default()))
}

/// Test resilience wrapper builder
pub struct TestWrapperBuilder {
    services: Vec<ServiceKeys>,
    timeout: Duration,
    cache_ttl: Duration,
    breaker: CircuitBreakerConfig,
}

impl TestWrapperBuilder {
    pub fn new() -> Self {
        Self {
            services: default_services(),
            timeout: Duration::from_secs(2),
            cache_ttl: Duration::from_secs(300),
            breaker: CircuitBreakerConfig::default(),
        }
    }

    pub fn with_services(mut self, services: Vec<ServiceKeys>) -> Self {
        self.services = services;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_breaker_threshold(mut self, failures: usize) -> Self {
        self.breaker.failure_threshold = failures;
        self
    }

    pub fn build(self) -> ResilienceWrapper {
        ResilienceWrapper::new(
            key_manager(&self.services),
            self.timeout,
            Arc::new(ResponseCache::new(self.cache_ttl, 100)),
            self.breaker,
        )
    }
}

impl Default for TestWrapperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration with the default services and the test admin token.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig {
        services: default_services(),
        ..AppConfig::default()
    };
    config.server.admin_token = Some(ADMIN_TOKEN.to_string());
    config.server.test_mode = true;
    config
}
