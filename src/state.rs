// src/state.rs

use crate::config::AppConfig;
use crate::error::Result;
use crate::key_manager::KeyManager;
use crate::probe::KeyProber;
use crate::resilience::ResilienceWrapper;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Shared state handed to every Axum handler and to the background sweeper.
#[derive(Debug)]
pub struct AppState {
    pub config: AppConfig,
    pub key_manager: Arc<KeyManager>,
    pub resilience: ResilienceWrapper,
    pub prober: KeyProber,
    pub start_time: Instant,
}

impl AppState {
    /// Builds the key manager, resilience wrapper and prober from `config`.
    /// Fails only when the probe HTTP client cannot be built.
    pub fn new(config: AppConfig) -> Result<Self> {
        info!("Creating shared AppState");
        let key_manager = Arc::new(KeyManager::from_config(&config));
        let resilience = ResilienceWrapper::from_config(key_manager.clone(), &config.resilience);
        let prober = KeyProber::new(key_manager.clone(), &config)?;

        Ok(Self {
            config,
            key_manager,
            resilience,
            prober,
            start_time: Instant::now(),
        })
    }
}
