// src/resilience/envelope.rs

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Where the data in an envelope came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Cache,
    Fallback,
}

/// Uniform result of a resilient fetch.
///
/// `data` is always present: on failure it holds cached or fallback data, so
/// callers only branch on `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope<T> {
    pub success: bool,
    pub data: T,
    pub source: DataSource,
    pub cached: bool,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ResultEnvelope<T> {
    pub fn live(data: T) -> Self {
        Self {
            success: true,
            data,
            source: DataSource::Live,
            cached: false,
            timestamp: now_rfc3339(),
            error: None,
        }
    }

    /// A fresh cache hit served without touching the upstream.
    pub fn cache_hit(data: T, stored_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            data,
            source: DataSource::Cache,
            cached: true,
            timestamp: stored_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            error: None,
        }
    }

    /// Previously cached data returned because the upstream failed.
    pub fn stale(data: T, stored_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data,
            source: DataSource::Cache,
            cached: true,
            timestamp: stored_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            error: Some(error.into()),
        }
    }

    pub fn fallback(data: T, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data,
            source: DataSource::Fallback,
            cached: false,
            timestamp: now_rfc3339(),
            error: Some(error.into()),
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
