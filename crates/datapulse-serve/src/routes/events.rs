//! Event logging endpoints.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use datapulse_core::metrics::{BULK_INSERTS_TOTAL, EVENTS_LOGGED_TOTAL};
use datapulse_core::{Error as EventError, Event, EventKind, LogEntry};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

const DATASET_ID_REQUIRED: &str = "Dataset ID is required";
const LOGS_REQUIRED: &str = "Logs array is required";
const INVALID_BODY: &str = "Invalid request body";

/// Body of the single-event logging endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct LogDatasetRequest {
    #[serde(rename = "datasetId", default)]
    pub dataset_id: Option<String>,
}

/// Response of the single-event logging endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct LogDatasetResponse {
    success: bool,
    log: Event,
}

/// `POST /log-dataset-view`
pub async fn log_view(
    State(state): State<AppState>,
    payload: Result<Json<LogDatasetRequest>, JsonRejection>,
) -> Result<Json<LogDatasetResponse>, ApiError> {
    log_event(&state, EventKind::View, payload).await
}

/// `POST /log-dataset-download`
pub async fn log_download(
    State(state): State<AppState>,
    payload: Result<Json<LogDatasetRequest>, JsonRejection>,
) -> Result<Json<LogDatasetResponse>, ApiError> {
    log_event(&state, EventKind::Download, payload).await
}

async fn log_event(
    state: &AppState,
    kind: EventKind,
    payload: Result<Json<LogDatasetRequest>, JsonRejection>,
) -> Result<Json<LogDatasetResponse>, ApiError> {
    // An unreadable body carries no dataset ID either.
    let dataset_id = payload
        .ok()
        .and_then(|Json(body)| body.dataset_id)
        .ok_or_else(|| ApiError::BadRequest(DATASET_ID_REQUIRED.to_string()))?;

    let event = Event::record(kind, &dataset_id).map_err(|e| match e {
        EventError::MissingField(_) => ApiError::BadRequest(DATASET_ID_REQUIRED.to_string()),
        other => ApiError::BadRequest(other.to_string()),
    })?;

    state.store.insert_event(&event).await?;

    metrics::counter!(EVENTS_LOGGED_TOTAL, "kind" => kind.as_str()).increment(1);
    tracing::info!(kind = %kind, dataset_id = %event.dataset_id, "event logged");

    Ok(Json(LogDatasetResponse {
        success: true,
        log: event,
    }))
}

/// Body of the bulk insert endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct InsertJsonRequest {
    #[serde(default)]
    pub logs: Option<Vec<LogEntry>>,
}

/// Response of the bulk insert endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct InsertJsonResponse {
    success: bool,
    inserted: usize,
}

/// `POST /insert-json`
///
/// Validates every entry before writing anything; the batch is inserted
/// with one parameter-bound statement or not at all.
pub async fn insert_json(
    State(state): State<AppState>,
    payload: Result<Json<InsertJsonRequest>, JsonRejection>,
) -> Result<Json<InsertJsonResponse>, ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "rejected bulk insert body");
        ApiError::BadRequest(INVALID_BODY.to_string())
    })?;

    let logs = body
        .logs
        .filter(|logs| !logs.is_empty())
        .ok_or_else(|| ApiError::BadRequest(LOGS_REQUIRED.to_string()))?;

    let events = logs
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            Event::try_from(entry).map_err(|e| {
                ApiError::BadRequest(format!("Invalid log entry at index {index}: {e}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    state.store.insert_events(&events).await?;

    metrics::counter!(BULK_INSERTS_TOTAL).increment(1);
    tracing::info!(count = events.len(), "bulk insert complete");

    Ok(Json(InsertJsonResponse {
        success: true,
        inserted: events.len(),
    }))
}
