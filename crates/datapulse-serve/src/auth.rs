//! Shared-secret authentication middleware.

use axum::extract::{Request, State};
use axum::http::Method;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::AppState;

/// Middleware that requires the shared secret on mutating routes.
///
/// The secret must be provided in the `Authorization` header as:
/// ```text
/// Authorization: Bearer <secret>
/// ```
///
/// `OPTIONS` requests pass through unchecked so CORS preflights succeed.
/// Runs before any body extraction, so an unauthenticated request is
/// rejected with 403 before its payload is validated.
pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header.and_then(|header| header.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => {
            tracing::debug!("missing or malformed authorization header");
            return Err(ApiError::Unauthorized);
        }
    };

    if !constant_time_eq(token.as_bytes(), state.config.secret_key.as_bytes()) {
        tracing::debug!("invalid shared secret");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Byte comparison whose running time depends only on the input lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
