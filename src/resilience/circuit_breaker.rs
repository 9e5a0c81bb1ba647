// src/resilience/circuit_breaker.rs

use crate::config::CircuitBreakerSettings;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failing fast
    HalfOpen, // Testing if the service recovered
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub recovery_timeout: Duration,
    pub success_threshold: usize, // Successes needed in half-open to close
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            recovery_timeout: Duration::from_secs(settings.recovery_timeout_secs),
            success_threshold: settings.success_threshold,
        }
    }
}

#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    failure_count: usize,
    success_count: usize,
    next_attempt: Option<Instant>,
}

/// Per-service breaker. Counts logical calls that ended without live data,
/// not individual credential attempts.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: RwLock<CircuitBreakerState>,
    total_requests: AtomicU64,
    total_failures: AtomicU64,
    rejected_requests: AtomicU64,
    name: String,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(CircuitBreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                next_attempt: None,
            }),
            total_requests: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            name,
        }
    }

    /// Whether a call may go upstream. Moves `Open` to `HalfOpen` once the
    /// recovery timeout has passed.
    pub async fn allow_request(&self) -> bool {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.write().await;

        let allowed = match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match state.next_attempt {
                Some(next_attempt) if Instant::now() >= next_attempt => {
                    info!(circuit_breaker = %self.name, "Circuit breaker transitioning to half-open");
                    state.state = CircuitState::HalfOpen;
                    state.success_count = 0;
                    true
                }
                _ => false,
            },
        };

        if !allowed {
            self.rejected_requests.fetch_add(1, Ordering::Relaxed);
            debug!(circuit_breaker = %self.name, "Circuit breaker is open, failing fast");
        }
        allowed
    }

    pub async fn on_success(&self) {
        let mut state = self.state.write().await;

        match state.state {
            CircuitState::Closed => {
                state.failure_count = state.failure_count.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    info!(circuit_breaker = %self.name, "Circuit breaker closing after successful recovery");
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.next_attempt = None;
                }
            }
            CircuitState::Open => {
                warn!(circuit_breaker = %self.name, "Unexpected success in open state");
            }
        }
    }

    pub async fn on_failure(&self) {
        let mut state = self.state.write().await;
        let now = Instant::now();

        self.total_failures.fetch_add(1, Ordering::Relaxed);
        state.failure_count += 1;

        match state.state {
            CircuitState::Closed => {
                if state.failure_count >= self.config.failure_threshold {
                    warn!(
                        circuit_breaker = %self.name,
                        failure_count = state.failure_count,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker opening due to failures"
                    );
                    state.state = CircuitState::Open;
                    state.next_attempt = self.reopen_at(now);
                }
            }
            CircuitState::HalfOpen => {
                warn!(circuit_breaker = %self.name, "Circuit breaker reopening after failed recovery attempt");
                state.state = CircuitState::Open;
                state.next_attempt = self.reopen_at(now);
                state.success_count = 0;
            }
            CircuitState::Open => {
                state.next_attempt = self.reopen_at(now);
            }
        }
    }

    /// `None` when the recovery timeout is past what `Instant` can represent;
    /// the breaker then stays open.
    fn reopen_at(&self, now: Instant) -> Option<Instant> {
        let at = now.checked_add(self.config.recovery_timeout);
        if at.is_none() {
            warn!(circuit_breaker = %self.name, "Recovery timeout out of range, circuit will stay open");
        }
        at
    }

    pub async fn get_state(&self) -> CircuitState {
        self.state.read().await.state
    }

    pub async fn status(&self) -> CircuitStatus {
        CircuitStatus {
            state: self.get_state().await,
            stats: self.get_stats(),
        }
    }

    pub fn get_stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStats {
    pub total_requests: u64,
    pub total_failures: u64,
    pub rejected_requests: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CircuitStatus {
    pub state: CircuitState,
    #[serde(flatten)]
    pub stats: CircuitBreakerStats,
}

/// Lazily created breakers, one per service name.
#[derive(Debug)]
pub struct CircuitBreakers {
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakers {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, service: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .lock()
            .entry(service.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(service.to_string(), self.config.clone()))
            })
            .clone()
    }

    pub async fn statuses(&self) -> HashMap<String, CircuitStatus> {
        let breakers: Vec<(String, Arc<CircuitBreaker>)> = self
            .breakers
            .lock()
            .iter()
            .map(|(name, b)| (name.clone(), b.clone()))
            .collect();

        let mut statuses = HashMap::with_capacity(breakers.len());
        for (name, breaker) in breakers {
            statuses.insert(name, breaker.status().await);
        }
        statuses
    }
}
