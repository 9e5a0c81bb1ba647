// src/admin.rs

use crate::error::{AppError, Result};
use crate::key_manager::{mask_key, ServiceStatus};
use crate::probe::ServiceValidation;
use crate::resilience::{CacheStats, CircuitStatus};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

// --- Router Definition ---

/// Admin routes, all behind the admin token check.
pub fn admin_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new().nest(
        "/admin",
        Router::new()
            .route("/keys", get(list_keys))
            .route("/keys/validate", post(validate_keys))
            .route("/keys/:service/reset", post(reset_key))
            .route("/resilience", get(resilience_status))
            .route("/cache", delete(clear_cache))
            .route_layer(middleware::from_fn_with_state(
                state,
                crate::middleware::admin_auth_middleware,
            )),
    )
}

// --- Request/Response Structs ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetKeyRequest {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetKeyResponse {
    pub service: String,
    pub key: String,
    pub reset: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub uptime_seconds: u64,
    /// Service name to whether it has a usable credential.
    pub services: BTreeMap<String, bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResilienceStatus {
    pub cache: CacheStats,
    pub circuits: HashMap<String, CircuitStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ClearCacheParams {
    /// Substring of the cache keys to drop. Everything when absent.
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearCacheResponse {
    pub cleared: usize,
    pub pattern: Option<String>,
}

// --- Route Handlers ---

/// Liveness plus a per-service summary. `degraded` when some service has no
/// usable credential; always answers 200.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let services: BTreeMap<String, bool> = state
        .key_manager
        .services()
        .into_iter()
        .map(|name| {
            let available = state.key_manager.has_available_keys(&name);
            (name, available)
        })
        .collect();

    let status = if services.values().all(|ok| *ok) {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthStatus {
        status,
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        services,
    })
}

pub async fn list_keys(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, ServiceStatus>> {
    Json(state.key_manager.status())
}

/// Clears the failure history of one credential.
pub async fn reset_key(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
    Json(request): Json<ResetKeyRequest>,
) -> Result<Json<ResetKeyResponse>> {
    if !state.key_manager.services().contains(&service) {
        return Err(AppError::UnknownService(service));
    }
    if !state.key_manager.reset_key(&service, &request.key) {
        return Err(AppError::NotFound(format!(
            "credential is not configured for service '{service}'"
        )));
    }

    info!(service = %service, api_key.preview = %mask_key(&request.key), "Key reset via admin API");
    Ok(Json(ResetKeyResponse {
        key: mask_key(&request.key),
        service,
        reset: true,
    }))
}

pub async fn validate_keys(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, ServiceValidation>> {
    Json(state.prober.validate_all_keys().await)
}

pub async fn resilience_status(State(state): State<Arc<AppState>>) -> Json<ResilienceStatus> {
    Json(ResilienceStatus {
        cache: state.resilience.cache_stats().await,
        circuits: state.resilience.circuit_statuses().await,
    })
}

pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClearCacheParams>,
) -> Json<ClearCacheResponse> {
    let cleared = state.resilience.clear_cache(params.pattern.as_deref()).await;
    info!(cleared, pattern = ?params.pattern, "Cache cleared via admin API");
    Json(ClearCacheResponse {
        cleared,
        pattern: params.pattern,
    })
}
