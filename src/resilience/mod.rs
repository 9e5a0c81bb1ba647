// src/resilience/mod.rs

pub mod cache;
pub mod circuit_breaker;
pub mod envelope;
pub mod error;
pub mod wrapper;

pub use cache::{CacheStats, ResponseCache};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStatus};
pub use envelope::{DataSource, ResultEnvelope};
pub use error::{check_status, FetchError};
pub use wrapper::ResilienceWrapper;
