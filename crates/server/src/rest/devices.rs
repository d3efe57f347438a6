use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use lumiwatch_engine::notifier::{DlqEntry, NotificationJob};
use lumiwatch_engine::query::{DeviceSnapshot, IngestStats};

use super::AppState;

pub async fn list_devices(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.query.device_ids())
}

pub async fn get_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceSnapshot>, StatusCode> {
    state
        .query
        .device_snapshot(&device_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn failed_notifications(State(state): State<AppState>) -> Json<Vec<NotificationJob>> {
    Json(state.query.failed_notifications())
}

/// Dead-lettered deliveries from the database. Empty when the server
/// runs without one.
pub async fn dead_letters(
    State(state): State<AppState>,
) -> Result<Json<Vec<DlqEntry>>, StatusCode> {
    let Some(ref dlq) = state.dlq else {
        return Ok(Json(Vec::new()));
    };
    match dlq.list_recent(100).await {
        Ok(entries) => Ok(Json(entries)),
        Err(e) => {
            tracing::error!(error = %e, "dead letter query failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn ingest_stats(State(state): State<AppState>) -> Json<IngestStats> {
    Json(state.query.ingest_stats())
}
