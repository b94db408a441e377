//! Event Store: persistence and aggregation of dataset events.
//!
//! [`ClickHouseStore`] is the production backend. The `clickhouse` client
//! keeps an internal keep-alive connection pool; every statement checks out
//! a connection for its own duration and hands it back on completion or
//! failure, so no handler ever holds a connection across statements.
//!
//! [`MemoryStore`] keeps events in process and is used by tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use clickhouse::{Client, Row};
use datapulse_core::{CandidateStat, Event, EventKind, rank_candidates};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::state::Config;

/// Table holding one row per logged interaction.
pub const EVENTS_TABLE: &str = "dataset_events";

/// Errors raised by an [`EventStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// ClickHouse query or connection failure.
    #[error("ClickHouse error: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),

    /// Backend could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for dataset events and the popularity aggregation over them.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Persist a single event.
    async fn insert_event(&self, event: &Event) -> Result<(), StoreError>;

    /// Persist a batch of events in one statement.
    ///
    /// An empty batch is a no-op.
    async fn insert_events(&self, events: &[Event]) -> Result<(), StoreError>;

    /// Per-dataset view/download counts ordered by descending popularity
    /// (ties by dataset ID ascending), truncated to `limit`.
    async fn top_candidates(&self, limit: usize) -> Result<Vec<CandidateStat>, StoreError>;
}

/// Row structure matching the `dataset_events` table.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
struct EventRow {
    event_type: String,
    dataset_id: String,
    /// `DateTime64(3)` is transferred as milliseconds since the Unix epoch.
    timestamp: i64,
}

impl From<&Event> for EventRow {
    fn from(event: &Event) -> Self {
        Self {
            event_type: event.event_kind.as_str().to_string(),
            dataset_id: event.dataset_id.clone(),
            timestamp: event.timestamp.timestamp_millis(),
        }
    }
}

/// Aggregated counts for one dataset.
#[derive(Debug, Clone, Row, Deserialize)]
struct CountsRow {
    dataset_id: String,
    views: u64,
    downloads: u64,
}

/// ClickHouse-backed [`EventStore`].
#[derive(Clone)]
pub struct ClickHouseStore {
    client: Client,
}

impl ClickHouseStore {
    /// Create a store from configuration. No connection is made until the
    /// first statement runs.
    pub fn new(config: &Config) -> Self {
        let mut client = Client::default()
            .with_url(&config.clickhouse_url)
            .with_database(&config.clickhouse_database);

        if let Some(user) = &config.clickhouse_user {
            client = client.with_user(user);
        }
        if let Some(password) = &config.clickhouse_password {
            client = client.with_password(password);
        }

        tracing::info!(
            url = %config.clickhouse_url,
            database = %config.clickhouse_database,
            table = EVENTS_TABLE,
            "ClickHouse event store configured"
        );

        Self { client }
    }

    /// Create the events table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.client
            .query(&format!(
                "CREATE TABLE IF NOT EXISTS {EVENTS_TABLE} (
                    event_type LowCardinality(String),
                    dataset_id String,
                    timestamp DateTime64(3, 'UTC')
                )
                ENGINE = MergeTree
                ORDER BY (dataset_id, timestamp)"
            ))
            .execute()
            .await?;

        tracing::info!(table = EVENTS_TABLE, "event table ready");
        Ok(())
    }
}

#[async_trait]
impl EventStore for ClickHouseStore {
    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        self.insert_events(std::slice::from_ref(event)).await
    }

    async fn insert_events(&self, events: &[Event]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        // RowBinary insert: values are encoded in the body, never in SQL text.
        let mut inserter = self.client.insert::<EventRow>(EVENTS_TABLE)?;
        for event in events {
            inserter.write(&EventRow::from(event)).await?;
        }
        inserter.end().await?;

        tracing::debug!(count = events.len(), "inserted events");
        Ok(())
    }

    async fn top_candidates(&self, limit: usize) -> Result<Vec<CandidateStat>, StoreError> {
        // Ordering key is 10x the popularity score, kept in integers so ties
        // are exact; see `CandidateStat::rank_key`.
        let rows: Vec<CountsRow> = self
            .client
            .query(&format!(
                "SELECT
                    dataset_id,
                    countIf(event_type = ?) AS views,
                    countIf(event_type = ?) AS downloads
                FROM {EVENTS_TABLE}
                GROUP BY dataset_id
                ORDER BY (4 * views + 6 * downloads) DESC, dataset_id ASC
                LIMIT ?"
            ))
            .bind(EventKind::View.as_str())
            .bind(EventKind::Download.as_str())
            .bind(limit as u64)
            .fetch_all()
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| CandidateStat::from_counts(row.dataset_id, row.views, row.downloads))
            .collect())
    }
}

/// In-process [`EventStore`] holding events in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: RwLock<Vec<Event>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored event in insertion order.
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        self.events.write().push(event.clone());
        Ok(())
    }

    async fn insert_events(&self, events: &[Event]) -> Result<(), StoreError> {
        self.events.write().extend_from_slice(events);
        Ok(())
    }

    async fn top_candidates(&self, limit: usize) -> Result<Vec<CandidateStat>, StoreError> {
        let events = self.events.read();
        let mut counts: HashMap<&str, (u64, u64)> = HashMap::new();
        for event in events.iter() {
            let entry = counts.entry(event.dataset_id.as_str()).or_default();
            match event.event_kind {
                EventKind::View => entry.0 += 1,
                EventKind::Download => entry.1 += 1,
            }
        }

        let candidates = counts
            .into_iter()
            .map(|(id, (views, downloads))| CandidateStat::from_counts(id, views, downloads))
            .collect();

        Ok(rank_candidates(candidates, limit))
    }
}
