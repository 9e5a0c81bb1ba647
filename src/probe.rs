// src/probe.rs

use crate::config::{AppConfig, ProbeConfig};
use crate::error::{AppError, Result};
use crate::key_manager::{mask_key, KeyManager};
use reqwest::Client;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Validation outcome of one service's credentials.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceValidation {
    pub total_keys: usize,
    pub valid_keys: usize,
    /// One entry per credential in configured order. Empty when the service
    /// has no probe.
    pub results: Vec<KeyValidation>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct KeyValidation {
    pub index: usize,
    pub key: String,
    pub valid: bool,
}

/// Checks credentials against the provider with a cheap live request.
#[derive(Debug, Clone)]
pub struct KeyProber {
    client: Client,
    key_manager: Arc<KeyManager>,
    probes: HashMap<String, ProbeConfig>,
    timeout: Duration,
}

impl KeyProber {
    pub fn new(key_manager: Arc<KeyManager>, config: &AppConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.probe_timeout_secs);
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(AppError::HttpClientBuild)?;

        let probes = config
            .services
            .iter()
            .filter_map(|s| s.probe.clone().map(|p| (s.name.clone(), p)))
            .collect();

        Ok(Self {
            client,
            key_manager,
            probes,
            timeout,
        })
    }

    /// `true` when the provider answers the probe request with 2xx.
    /// Transport errors and services without a probe count as invalid.
    #[instrument(skip(self, key), fields(api_key.preview = %mask_key(key)))]
    pub async fn test_key(&self, service: &str, key: &str) -> bool {
        let Some(probe) = self.probes.get(service) else {
            warn!(service, "No probe configured for service");
            return false;
        };

        let request = match &probe.query_param {
            Some(param) => self.client.get(&probe.url).query(&[(param.as_str(), key)]),
            None => self.client.get(&probe.url).bearer_auth(key),
        };

        match request.timeout(self.timeout).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(service, status = status.as_u16(), "Probe response received");
                status.is_success()
            }
            Err(e) => {
                warn!(service, error = %e, "Probe request failed");
                false
            }
        }
    }

    /// Probe every configured credential of every service.
    pub async fn validate_all_keys(&self) -> BTreeMap<String, ServiceValidation> {
        let mut report = BTreeMap::new();

        for service in self.key_manager.services() {
            let keys = self.key_manager.credentials(&service);
            let mut results = Vec::new();

            if self.probes.contains_key(&service) {
                for (index, key) in keys.iter().enumerate() {
                    results.push(KeyValidation {
                        index,
                        key: mask_key(key),
                        valid: self.test_key(&service, key).await,
                    });
                }
            }

            let validation = ServiceValidation {
                total_keys: keys.len(),
                valid_keys: results.iter().filter(|r| r.valid).count(),
                results,
            };
            info!(
                service = %service,
                total_keys = validation.total_keys,
                valid_keys = validation.valid_keys,
                "Credential validation finished"
            );
            report.insert(service, validation);
        }

        report
    }
}
