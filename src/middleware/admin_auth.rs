// src/middleware/admin_auth.rs

use crate::{error::AppError, state::AppState};
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Constant-time string comparison to prevent timing attacks
fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }
    result == 0
}

/// Rejects admin requests whose `x-admin-token` header does not match the
/// configured token. With no token configured every request is rejected.
pub async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let expected_token = state.config.server.admin_token.as_deref();

    match expected_token {
        Some(expected) if !expected.is_empty() => {
            let provided = req
                .headers()
                .get(ADMIN_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok());

            match provided {
                Some(token) if secure_compare(token, expected) => {
                    debug!("Admin authentication successful");
                    Ok(next.run(req).await)
                }
                _ => {
                    warn!("Admin authentication failed: invalid or missing token");
                    Err(AppError::Unauthorized)
                }
            }
        }
        _ => {
            warn!("Admin authentication failed: no admin token configured");
            Err(AppError::Unauthorized)
        }
    }
}
