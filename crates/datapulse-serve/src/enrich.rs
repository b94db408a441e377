//! Metadata enrichment of ranked candidates.

use std::time::Instant;

use datapulse_core::metrics::{
    ENRICHMENT_DURATION_SECONDS, ENRICHMENT_LOOKUPS_TOTAL, ENRICHMENT_SKIPPED_TOTAL,
};
use datapulse_core::{CandidateStat, EnrichedDataset};
use futures::{StreamExt, stream};

use crate::registry::{LookupError, MetadataSource};

/// Enrich candidates in order until `quota` succeed or candidates run out.
///
/// Lookups are issued one at a time and lazily: once `quota` datasets have
/// been enriched no further candidate is looked up. A failed lookup drops
/// that candidate and the next one may take its place; relative order of
/// the input is preserved.
pub async fn enrich(
    source: &dyn MetadataSource,
    candidates: &[CandidateStat],
    quota: usize,
) -> Vec<EnrichedDataset> {
    let started = Instant::now();

    let enriched: Vec<EnrichedDataset> = stream::iter(candidates)
        .then(|candidate| async move {
            metrics::counter!(ENRICHMENT_LOOKUPS_TOTAL).increment(1);
            match source.lookup(&candidate.dataset_id).await {
                Ok(metadata) => Some(EnrichedDataset::new(candidate, metadata)),
                Err(err) => {
                    log_skip(&candidate.dataset_id, &err);
                    metrics::counter!(ENRICHMENT_SKIPPED_TOTAL, "reason" => err.reason())
                        .increment(1);
                    None
                }
            }
        })
        .filter_map(|item| async move { item })
        .take(quota)
        .collect()
        .await;

    metrics::histogram!(ENRICHMENT_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    tracing::debug!(
        candidates = candidates.len(),
        enriched = enriched.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "enrichment finished"
    );

    enriched
}

fn log_skip(dataset_id: &str, err: &LookupError) {
    match err {
        LookupError::NotFound => {
            tracing::debug!(dataset_id = %dataset_id, "dataset missing from registry, skipping");
        }
        other => {
            tracing::warn!(dataset_id = %dataset_id, error = %other, "metadata lookup failed, skipping");
        }
    }
}
