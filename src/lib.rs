// src/lib.rs

pub mod admin;
pub mod cli;
pub mod config;
pub mod error;
pub mod key_manager;
pub mod middleware;
pub mod probe;
pub mod resilience;
pub mod state;
pub mod storage;
pub mod sweeper;

use axum::{
    body::Body,
    http::{HeaderValue, Request as AxumRequest},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::{path::PathBuf, sync::Arc, time::Instant};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use key_manager::{mask_key, KeyManager, KeyPolicy};
pub use resilience::{DataSource, FetchError, ResilienceWrapper, ResultEnvelope};
pub use state::AppState;
pub use sweeper::BlacklistSweeper;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Builds the application router: public health route plus the admin API.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(admin::health_check))
        .merge(admin::admin_routes(state.clone()))
        .layer(axum::middleware::from_fn(trace_requests))
        .with_state(state)
}

/// Middleware adding a request id and a tracing span to every request.
async fn trace_requests(
    mut req: AxumRequest<Body>,
    next: axum::middleware::Next,
) -> impl IntoResponse {
    let request_id = Uuid::new_v4();
    let start_time = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        http.method = %method,
        url.path = %path,
    );

    req.extensions_mut().insert(request_id);

    async move {
        let mut response = next.run(req).await;
        let elapsed = start_time.elapsed();

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        info!(
            http.response.duration = ?elapsed,
            http.status_code = response.status().as_u16(),
            "Finished processing request"
        );

        response
    }
    .instrument(span)
    .await
}

/// Loads, validates and logs the configuration. The path falls back to
/// `FARMGUARD_CONFIG`, then `config.yaml`; a missing file means defaults
/// plus environment.
pub fn setup_configuration(config_path_override: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = config_path_override.unwrap_or_else(|| {
        std::env::var("FARMGUARD_CONFIG").map_or_else(|_| PathBuf::from("config.yaml"), PathBuf::from)
    });

    let config_path_display = config_path.display().to_string();
    let app_config = config::load_config(&config_path).map_err(|e| {
        error!(
            config.path = %config_path_display,
            error = ?e,
            "Failed to load or validate configuration"
        );
        e
    })?;

    let service_names: Vec<&str> = app_config.services.iter().map(|s| s.name.as_str()).collect();
    info!(
        config.path = %config_path_display,
        config.services.count = app_config.services.len(),
        config.services.names = ?service_names,
        config.total_keys = app_config.total_keys(),
        server.port = app_config.server.port,
        "Configuration loaded and validated successfully"
    );

    Ok(app_config)
}

/// Creates the shared state and the router for `config`.
pub fn build_app(config: AppConfig) -> Result<(Router, Arc<AppState>)> {
    let state = Arc::new(AppState::new(config).map_err(|e| {
        error!(error = ?e, "Failed to initialize application state");
        e
    })?);
    info!("Application state initialized successfully");

    Ok((create_router(state.clone()), state))
}
