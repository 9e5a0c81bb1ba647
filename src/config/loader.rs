// src/config/loader.rs

use crate::config::environment::{load_service_keys_from_env, EnvironmentConfig};
use crate::config::{AppConfig, ConfigValidator, ServiceKeys};
use crate::error::{AppError, Result};
use std::path::Path;
use tracing::{debug, info};

/// Load configuration from file (when present) and environment variables.
pub fn load_config(config_path: &Path) -> Result<AppConfig> {
    let mut config = if config_path.exists() {
        info!("Loading configuration from file: {}", config_path.display());
        load_from_file(config_path)?
    } else {
        info!("Configuration file not found, using defaults");
        AppConfig::default()
    };

    let env_config = EnvironmentConfig::from_env();
    if env_config.has_overrides() {
        info!(overrides = ?env_config.override_summary(), "Applying environment overrides");
    }
    apply_environment(&mut config, &env_config, load_service_keys_from_env());

    ConfigValidator::validate(&config)?;

    debug!("Configuration loaded and validated successfully");
    Ok(config)
}

pub fn load_from_file(config_path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(config_path).map_err(|_| AppError::ConfigNotFound {
        path: config_path.display().to_string(),
    })?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig = serde_yaml::from_str(content).map_err(|e| AppError::ConfigParse {
        message: format!("Failed to parse config file: {e}"),
        line: e.location().map(|loc| loc.line()),
    })?;

    Ok(AppConfig {
        services: config
            .services
            .into_iter()
            .map(ServiceKeys::normalized)
            .collect(),
        ..config
    })
}

/// Applies server overrides and merges environment credentials into the
/// same-named services. An environment primary replaces the file primary,
/// which is kept as the first alternative; environment alternatives are
/// appended. Services only present in the environment are added.
pub fn apply_environment(
    config: &mut AppConfig,
    env_config: &EnvironmentConfig,
    env_services: Vec<ServiceKeys>,
) {
    if let Some(host) = &env_config.server_host {
        info!("Overriding server host from environment: {}", host);
        config.server.host = host.clone();
    }
    if let Some(port) = env_config.server_port {
        info!("Overriding server port from environment: {}", port);
        config.server.port = port;
    }
    if let Some(token) = &env_config.admin_token {
        info!("Overriding admin token from environment");
        config.server.admin_token = Some(token.clone());
    }

    for env_service in env_services {
        match config
            .services
            .iter_mut()
            .find(|s| s.name == env_service.name)
        {
            Some(existing) => {
                debug!(service = %existing.name, "Merging credentials from environment");
                if let Some(primary) = env_service.primary {
                    if let Some(old) = existing.primary.replace(primary) {
                        existing.alternatives.insert(0, old);
                    }
                }
                existing.alternatives.extend(env_service.alternatives);
                *existing = std::mem::take(existing).normalized();
            }
            None => {
                debug!(service = %env_service.name, "Adding service from environment");
                config.services.push(env_service.normalized());
            }
        }
    }
}
