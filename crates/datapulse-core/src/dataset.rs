//! Datasets enriched with registry metadata.

use serde::{Deserialize, Serialize};

use crate::ranking::CandidateStat;

/// Title shown when the registry has none.
pub const NO_TITLE: &str = "Без названия";

/// Publisher shown when the registry has none.
pub const UNKNOWN_PUBLISHER: &str = "Неизвестный издатель";

/// Description shown when the registry text has no usable lines.
pub const NO_DESCRIPTION: &str = "Нет описания.";

/// Number of description lines kept in a preview.
const PREVIEW_LINES: usize = 2;

/// Descriptive metadata for one dataset as reported by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub title: Option<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
}

/// A ranked dataset joined with its registry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedDataset {
    pub id: String,
    pub views: u64,
    pub downloads: u64,
    pub title: String,
    pub publisher: String,
    pub description: String,
}

impl EnrichedDataset {
    /// Join a candidate with its metadata, filling placeholders for gaps.
    pub fn new(candidate: &CandidateStat, metadata: DatasetMetadata) -> Self {
        Self {
            id: candidate.dataset_id.clone(),
            views: candidate.views,
            downloads: candidate.downloads,
            title: non_blank(metadata.title).unwrap_or_else(|| NO_TITLE.to_string()),
            publisher: non_blank(metadata.publisher)
                .unwrap_or_else(|| UNKNOWN_PUBLISHER.to_string()),
            description: preview_description(metadata.description.as_deref()),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Short preview of a free-text description.
///
/// Keeps the first two non-blank lines joined by a single space, or returns
/// [`NO_DESCRIPTION`] when nothing usable remains.
pub fn preview_description(description: Option<&str>) -> String {
    let lines: Vec<&str> = description
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(PREVIEW_LINES)
        .collect();

    if lines.is_empty() {
        NO_DESCRIPTION.to_string()
    } else {
        lines.join(" ")
    }
}
