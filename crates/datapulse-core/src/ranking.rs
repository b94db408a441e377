//! Popularity scoring for datasets.
//!
//! Scores are computed from raw event counts at query time and never stored:
//! downloads carry 60% of the weight, views 40%.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Weight of a single view in the popularity score.
pub const VIEW_WEIGHT: f64 = 0.4;

/// Weight of a single download in the popularity score.
pub const DOWNLOAD_WEIGHT: f64 = 0.6;

/// Number of top-scoring datasets considered for enrichment.
pub const CANDIDATE_LIMIT: usize = 20;

/// Maximum number of enriched datasets returned by the ranking endpoint.
pub const ENRICHMENT_QUOTA: usize = 6;

/// Weighted popularity of a dataset.
pub fn popularity_score(views: u64, downloads: u64) -> f64 {
    VIEW_WEIGHT * views as f64 + DOWNLOAD_WEIGHT * downloads as f64
}

/// Aggregated interaction counts for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateStat {
    pub dataset_id: String,
    pub views: u64,
    pub downloads: u64,
    pub popularity_score: f64,
}

impl CandidateStat {
    /// Build a candidate from its counts, deriving the popularity score.
    pub fn from_counts(dataset_id: impl Into<String>, views: u64, downloads: u64) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            views,
            downloads,
            popularity_score: popularity_score(views, downloads),
        }
    }

    /// Exact integer form of the score (`10 × popularity_score`).
    ///
    /// Used for ordering so that ties compare equal regardless of float
    /// rounding; the ClickHouse query sorts by the same expression.
    pub fn rank_key(&self) -> u128 {
        4 * u128::from(self.views) + 6 * u128::from(self.downloads)
    }
}

/// Order candidates by descending score, ties by dataset ID, and keep `limit`.
pub fn rank_candidates(mut candidates: Vec<CandidateStat>, limit: usize) -> Vec<CandidateStat> {
    candidates.sort_by(compare_rank);
    candidates.truncate(limit);
    candidates
}

fn compare_rank(a: &CandidateStat, b: &CandidateStat) -> Ordering {
    b.rank_key()
        .cmp(&a.rank_key())
        .then_with(|| a.dataset_id.cmp(&b.dataset_id))
}
