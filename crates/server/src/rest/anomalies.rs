use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use lumiwatch_common::time::now_ms;
use lumiwatch_engine::lifecycle::{Anomaly, AnomalyStatus, LifecycleError};
use lumiwatch_engine::query::AnomalyFilter;
use lumiwatch_engine::rules::Severity;

use super::AppState;

#[derive(Deserialize)]
pub struct ListAnomaliesQuery {
    pub status: Option<AnomalyStatus>,
    pub severity: Option<Severity>,
}

#[derive(Deserialize, Default)]
pub struct ResolveRequest {
    pub reason: Option<String>,
}

fn lifecycle_status(e: LifecycleError) -> StatusCode {
    match e {
        LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::InvalidTransition { .. } => StatusCode::CONFLICT,
    }
}

pub async fn list_anomalies(
    State(state): State<AppState>,
    Query(q): Query<ListAnomaliesQuery>,
) -> Json<Vec<Anomaly>> {
    Json(state.query.list_anomalies(AnomalyFilter {
        status: q.status,
        severity: q.severity,
    }))
}

pub async fn get_anomaly(
    State(state): State<AppState>,
    Path(anomaly_id): Path<String>,
) -> Result<Json<Anomaly>, StatusCode> {
    state
        .query
        .get_anomaly(&anomaly_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn acknowledge_anomaly(
    State(state): State<AppState>,
    Path(anomaly_id): Path<String>,
) -> Result<Json<Anomaly>, StatusCode> {
    state
        .lifecycle
        .acknowledge(&anomaly_id, now_ms())
        .map(Json)
        .map_err(lifecycle_status)
}

pub async fn investigate_anomaly(
    State(state): State<AppState>,
    Path(anomaly_id): Path<String>,
) -> Result<Json<Anomaly>, StatusCode> {
    state
        .lifecycle
        .mark_investigating(&anomaly_id, now_ms())
        .map(Json)
        .map_err(lifecycle_status)
}

pub async fn resolve_anomaly(
    State(state): State<AppState>,
    Path(anomaly_id): Path<String>,
    body: Option<Json<ResolveRequest>>,
) -> Result<Json<Anomaly>, StatusCode> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "resolved by operator".into());
    state
        .lifecycle
        .resolve(&anomaly_id, &reason, now_ms())
        .map(Json)
        .map_err(lifecycle_status)
}
