//! Dataset interaction events.
//!
//! An [`Event`] records a single view or download of a dataset. Events are
//! immutable once written and duplicates are expected (repeated views of the
//! same dataset are all counted).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest dataset identifier accepted, in bytes.
pub const MAX_DATASET_ID_LEN: usize = 256;

/// Kind of interaction being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    View,
    Download,
}

impl EventKind {
    /// Wire and storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Download => "download",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "view" => Ok(Self::View),
            "download" => Ok(Self::Download),
            other => Err(Error::InvalidField {
                field: "eventType",
                reason: format!("expected 'view' or 'download', got '{other}'"),
            }),
        }
    }
}

/// A single recorded interaction with a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "eventType")]
    pub event_kind: EventKind,
    pub dataset_id: String,
    #[serde(with = "rfc3339_millis")]
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Record an interaction happening now.
    ///
    /// The dataset ID is validated and trimmed; the timestamp is the current
    /// UTC time truncated to millisecond precision (the storage resolution).
    pub fn record(event_kind: EventKind, dataset_id: &str) -> Result<Self> {
        Ok(Self {
            event_kind,
            dataset_id: validate_dataset_id(dataset_id)?,
            timestamp: Utc::now().trunc_subsecs(3),
        })
    }
}

/// Validate a dataset identifier, returning its trimmed form.
///
/// # Errors
///
/// Returns [`Error::MissingField`] for an empty or whitespace-only ID and
/// [`Error::InvalidField`] when the ID exceeds [`MAX_DATASET_ID_LEN`].
pub fn validate_dataset_id(dataset_id: &str) -> Result<String> {
    let trimmed = dataset_id.trim();
    if trimmed.is_empty() {
        return Err(Error::MissingField("datasetId"));
    }
    if trimmed.len() > MAX_DATASET_ID_LEN {
        return Err(Error::InvalidField {
            field: "datasetId",
            reason: format!("longer than {MAX_DATASET_ID_LEN} bytes"),
        });
    }
    Ok(trimmed.to_string())
}

/// Untrusted event as submitted to the bulk insert endpoint.
///
/// Every field is optional here so that a missing field surfaces as a
/// validation error naming it, not as an opaque deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl TryFrom<LogEntry> for Event {
    type Error = Error;

    fn try_from(entry: LogEntry) -> Result<Self> {
        let event_kind = entry
            .event_type
            .as_deref()
            .ok_or(Error::MissingField("eventType"))?
            .parse()?;

        let dataset_id = validate_dataset_id(entry.dataset_id.as_deref().unwrap_or_default())?;

        let raw_timestamp = entry
            .timestamp
            .as_deref()
            .ok_or(Error::MissingField("timestamp"))?;
        let timestamp = DateTime::parse_from_rfc3339(raw_timestamp.trim())
            .map_err(|e| Error::InvalidField {
                field: "timestamp",
                reason: e.to_string(),
            })?
            .with_timezone(&Utc)
            .trunc_subsecs(3);

        Ok(Self {
            event_kind,
            dataset_id,
            timestamp,
        })
    }
}

/// RFC 3339 timestamps with millisecond precision and a `Z` suffix.
mod rfc3339_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
