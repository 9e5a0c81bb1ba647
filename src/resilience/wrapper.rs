// src/resilience/wrapper.rs

use crate::config::ResilienceConfig;
use crate::key_manager::{mask_key, KeyManager};
use crate::resilience::cache::{CacheStats, ResponseCache};
use crate::resilience::circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakers, CircuitStatus,
};
use crate::resilience::envelope::ResultEnvelope;
use crate::resilience::error::FetchError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Most attempts a single logical call makes: the best credential plus one alternate.
const MAX_ATTEMPTS: usize = 2;

/// Runs remote operations with credential rotation, a bounded timeout,
/// a single retry and a fallback, and never fails.
///
/// Cheap to clone; clones share the key manager, cache and breakers.
#[derive(Debug, Clone)]
pub struct ResilienceWrapper {
    key_manager: Arc<KeyManager>,
    default_timeout: Duration,
    cache: Arc<ResponseCache>,
    breakers: Arc<CircuitBreakers>,
}

impl ResilienceWrapper {
    pub fn new(
        key_manager: Arc<KeyManager>,
        default_timeout: Duration,
        cache: Arc<ResponseCache>,
        breaker_config: CircuitBreakerConfig,
    ) -> Self {
        Self {
            key_manager,
            default_timeout,
            cache,
            breakers: Arc::new(CircuitBreakers::new(breaker_config)),
        }
    }

    pub fn from_config(key_manager: Arc<KeyManager>, config: &ResilienceConfig) -> Self {
        let cache = ResponseCache::new(
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_max_entries,
        );
        Self::new(
            key_manager,
            Duration::from_secs(config.request_timeout_secs),
            Arc::new(cache),
            CircuitBreakerConfig::from(&config.circuit_breaker),
        )
    }

    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.key_manager
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Remove cached responses whose key contains `pattern`, or all of them.
    pub async fn clear_cache(&self, pattern: Option<&str>) -> usize {
        self.cache.clear(pattern).await
    }

    pub async fn circuit_statuses(&self) -> HashMap<String, CircuitStatus> {
        self.breakers.statuses().await
    }

    /// Run `operation` with the best credential for `service`, retrying once
    /// with the next usable credential. On failure the envelope carries
    /// `fallback` and the last error.
    pub async fn fetch_with_resilience<T, F, Fut>(
        &self,
        service: &str,
        operation: F,
        fallback: T,
    ) -> ResultEnvelope<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        self.fetch_with_timeout(service, operation, fallback, self.default_timeout)
            .await
    }

    /// Same as [`fetch_with_resilience`](Self::fetch_with_resilience) with a
    /// per-call timeout applied to each attempt.
    pub async fn fetch_with_timeout<T, F, Fut>(
        &self,
        service: &str,
        operation: F,
        fallback: T,
        timeout: Duration,
    ) -> ResultEnvelope<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        match self.fetch_live(service, &operation, timeout).await {
            Ok(data) => ResultEnvelope::live(data),
            Err(error) => {
                info!(service, error = %error, "Serving fallback data");
                ResultEnvelope::fallback(fallback, error)
            }
        }
    }

    /// Cache-aware variant. A fresh entry under `cache_key` is returned without
    /// calling the upstream; live results are stored; when every attempt
    /// fails, any cached value (even expired) is preferred over `fallback`.
    pub async fn fetch_cached<T, F, Fut>(
        &self,
        service: &str,
        cache_key: &str,
        operation: F,
        fallback: T,
    ) -> ResultEnvelope<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        if let Some(entry) = self.cache.get_fresh(cache_key).await {
            match serde_json::from_value::<T>(entry.data) {
                Ok(data) => {
                    debug!(service, cache_key, "Serving fresh cached data");
                    return ResultEnvelope::cache_hit(data, entry.stored_at);
                }
                Err(e) => warn!(service, cache_key, error = %e, "Cached entry has an unexpected shape"),
            }
        }

        match self.fetch_live(service, &operation, self.default_timeout).await {
            Ok(data) => {
                match serde_json::to_value(&data) {
                    Ok(value) => self.cache.put(cache_key.to_string(), value, None).await,
                    Err(e) => warn!(service, cache_key, error = %e, "Live result could not be cached"),
                }
                ResultEnvelope::live(data)
            }
            Err(error) => {
                if let Some(entry) = self.cache.get_any(cache_key).await {
                    if let Ok(data) = serde_json::from_value::<T>(entry.data) {
                        info!(service, cache_key, error = %error, "Serving stale cached data");
                        return ResultEnvelope::stale(data, entry.stored_at, error);
                    }
                }
                info!(service, error = %error, "Serving fallback data");
                ResultEnvelope::fallback(fallback, error)
            }
        }
    }

    /// Up to [`MAX_ATTEMPTS`] upstream attempts. The error string is what the
    /// envelope reports.
    async fn fetch_live<T, F, Fut>(
        &self,
        service: &str,
        operation: &F,
        timeout: Duration,
    ) -> Result<T, String>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let Some(mut key) = self.key_manager.get_best_key(service) else {
            warn!(service, "No API keys available");
            return Err(format!("no credentials configured for service '{service}'"));
        };

        let breaker = self.breakers.get(service);
        if !breaker.allow_request().await {
            return Err(format!("circuit open for service '{service}'"));
        }

        let mut attempt = 1;
        let last_error = loop {
            match Self::run_attempt(operation, key.clone(), timeout).await {
                Ok(data) => {
                    self.key_manager.report_success(service, &key);
                    breaker.on_success().await;
                    if attempt > 1 {
                        info!(service, api_key.preview = %mask_key(&key), attempt, "Request succeeded with alternate key");
                    }
                    return Ok(data);
                }
                Err(error) => {
                    warn!(
                        service,
                        api_key.preview = %mask_key(&key),
                        attempt,
                        status = ?error.status_code(),
                        error = %error,
                        "Upstream attempt failed"
                    );
                    self.key_manager
                        .report_failure(service, &key, error.status_code());

                    if attempt >= MAX_ATTEMPTS {
                        break error;
                    }
                    match self.key_manager.get_next_key(service, &key) {
                        Some(next) => {
                            key = next;
                            attempt += 1;
                        }
                        None => {
                            debug!(service, "No alternate key to retry with");
                            break error;
                        }
                    }
                }
            }
        };

        breaker.on_failure().await;
        Err(last_error.to_string())
    }

    async fn run_attempt<T, F, Fut>(
        operation: &F,
        key: String,
        timeout: Duration,
    ) -> Result<T, FetchError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        match tokio::time::timeout(timeout, operation(key)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    }
}
