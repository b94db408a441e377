//! Prometheus metrics helpers.
//!
//! # Usage
//!
//! ```rust,ignore
//! use datapulse_core::metrics::{init_metrics, start_metrics_server};
//!
//! let handle = init_metrics();
//! start_metrics_server(9091, handle).await?;
//!
//! metrics::counter!("datapulse_events_logged_total", "kind" => "view").increment(1);
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: `datapulse_`
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: only low-cardinality values (event kind, skip reason), never dataset IDs

use std::net::SocketAddr;

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Events written through the logging endpoints (label: kind).
pub const EVENTS_LOGGED_TOTAL: &str = "datapulse_events_logged_total";
/// Successful bulk insert requests.
pub const BULK_INSERTS_TOTAL: &str = "datapulse_bulk_inserts_total";
/// Ranking endpoint invocations.
pub const RANKING_REQUESTS_TOTAL: &str = "datapulse_ranking_requests_total";
/// Registry lookups attempted during enrichment.
pub const ENRICHMENT_LOOKUPS_TOTAL: &str = "datapulse_enrichment_lookups_total";
/// Candidates dropped during enrichment (label: reason).
pub const ENRICHMENT_SKIPPED_TOTAL: &str = "datapulse_enrichment_skipped_total";
/// Wall time of a full enrichment pass.
pub const ENRICHMENT_DURATION_SECONDS: &str = "datapulse_enrichment_duration_seconds";
/// Failed Event Store statements.
pub const STORAGE_ERRORS_TOTAL: &str = "datapulse_storage_errors_total";

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_metrics();
    Some(handle)
}

/// Serve `/metrics` on the given port from a background task.
///
/// The listener is bound before returning so that a port conflict surfaces
/// as an error at startup.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics server stopped");
        }
    });

    Ok(())
}

fn register_metrics() {
    describe_counter!(
        EVENTS_LOGGED_TOTAL,
        "Dataset events written through the logging endpoints"
    );
    describe_counter!(BULK_INSERTS_TOTAL, "Successful bulk insert requests");
    describe_counter!(RANKING_REQUESTS_TOTAL, "Popular dataset ranking requests");
    describe_counter!(
        ENRICHMENT_LOOKUPS_TOTAL,
        "Metadata registry lookups issued during enrichment"
    );
    describe_counter!(
        ENRICHMENT_SKIPPED_TOTAL,
        "Candidates skipped because their registry lookup failed"
    );
    describe_histogram!(
        ENRICHMENT_DURATION_SECONDS,
        "Time spent enriching one ranking response"
    );
    describe_counter!(STORAGE_ERRORS_TOTAL, "Failed event store statements");
}

/// Increment a counter by `count`.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}
