//! API route definitions.

mod datasets;
mod events;
mod health;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::auth::require_auth;
use crate::state::{AppState, Config};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the complete API router.
///
/// # Route Structure
///
/// ## Public (no auth)
/// - `GET /health` - Health check
/// - `GET /api/datasets` - Most popular datasets with registry metadata
///
/// ## Protected (shared secret required)
/// - `GET /ping` - Verify the shared secret
/// - `POST /log-dataset-view` - Record a view
/// - `POST /log-dataset-download` - Record a download
/// - `POST /insert-json` - Bulk insert pre-timestamped events
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/datasets",
            get(datasets::popular_datasets).layer(middleware::map_response(no_store)),
        );

    let protected = Router::new()
        .route("/ping", get(health::authenticated_ping))
        .route("/log-dataset-view", post(events::log_view))
        .route("/log-dataset-download", post(events::log_download))
        .route("/insert-json", post(events::insert_json))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let cors = cors_layer(&state.config);

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}

/// Cross-origin policy: one configured origin, `GET`/`POST`/`OPTIONS`,
/// `Content-Type` and `Authorization` headers.
///
/// The allow-origin header is only echoed back to that exact origin. Without
/// a configured origin it is never sent, so browsers only allow same-origin use.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    match config.cors_origin.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer.allow_origin(AllowOrigin::list([origin])),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "ignoring invalid CORS origin");
            layer
        }
        None => layer,
    }
}

/// Rankings are computed per request and must not be cached downstream.
async fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
