// src/config/mod.rs

pub mod app;
pub mod environment;
pub mod loader;
pub mod validation;

pub use app::{
    AppConfig, CircuitBreakerSettings, KeyPolicyConfig, ProbeConfig, ResilienceConfig,
    ServerConfig, ServiceKeys,
};
pub use loader::load_config;
pub use validation::ConfigValidator;
