//! Popular datasets endpoint.

use axum::Json;
use axum::extract::State;
use datapulse_core::metrics::RANKING_REQUESTS_TOTAL;
use datapulse_core::{CANDIDATE_LIMIT, ENRICHMENT_QUOTA, EnrichedDataset};

use crate::enrich::enrich;
use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/datasets`
///
/// Ranks datasets by popularity score and returns up to six of them joined
/// with registry metadata. Storage failures produce a 500; registry failures
/// only shorten the list.
pub async fn popular_datasets(
    State(state): State<AppState>,
) -> Result<Json<Vec<EnrichedDataset>>, ApiError> {
    metrics::counter!(RANKING_REQUESTS_TOTAL).increment(1);

    let candidates = state.store.top_candidates(CANDIDATE_LIMIT).await?;
    if candidates.is_empty() {
        tracing::debug!("no events recorded, skipping enrichment");
        return Ok(Json(Vec::new()));
    }

    let datasets = enrich(state.registry.as_ref(), &candidates, ENRICHMENT_QUOTA).await;

    tracing::info!(
        candidates = candidates.len(),
        returned = datasets.len(),
        "popular datasets ranked"
    );

    Ok(Json(datasets))
}
