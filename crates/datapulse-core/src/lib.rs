//! Core types and scoring for dataset popularity tracking.
//!
//! This crate provides:
//! - The [`Event`] model for dataset views and downloads, with validation
//! - Popularity scoring and candidate ranking ([`CandidateStat`])
//! - Registry metadata joining and description previews ([`EnrichedDataset`])
//! - Prometheus metrics helpers
//! - Shared error types

mod dataset;
mod error;
mod event;
pub mod metrics;
mod ranking;

pub use dataset::{
    DatasetMetadata, EnrichedDataset, NO_DESCRIPTION, NO_TITLE, UNKNOWN_PUBLISHER,
    preview_description,
};
pub use error::{Error, Result};
pub use event::{Event, EventKind, LogEntry, MAX_DATASET_ID_LEN, validate_dataset_id};
pub use ranking::{
    CANDIDATE_LIMIT, CandidateStat, DOWNLOAD_WEIGHT, ENRICHMENT_QUOTA, VIEW_WEIGHT,
    popularity_score, rank_candidates,
};
