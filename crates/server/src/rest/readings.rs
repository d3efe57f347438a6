use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use lumiwatch_engine::reading::{Metric, Reading};

use super::AppState;

#[derive(Deserialize)]
pub struct ReadingBody {
    pub device_id: String,
    pub metric: Metric,
    pub value: f64,
    /// Defaults to server receive time.
    pub timestamp_ms: Option<i64>,
}

/// The push boundary accepts one reading or a batch.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum IngestRequest {
    Single(ReadingBody),
    Batch(Vec<ReadingBody>),
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: usize,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub async fn ingest_reading(
    State(state): State<AppState>,
    Json(body): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), (StatusCode, Json<ErrorResponse>)> {
    let readings = match body {
        IngestRequest::Single(r) => vec![r],
        IngestRequest::Batch(rs) => rs,
    };
    if readings.is_empty() {
        return Err(bad_request("empty batch"));
    }

    let mut accepted = 0;
    let mut rejected = 0;
    let mut first_error = None;
    for body in readings {
        if body.device_id.is_empty() {
            rejected += 1;
            first_error.get_or_insert_with(|| "device_id must not be empty".to_string());
            continue;
        }
        let timestamp_ms = body
            .timestamp_ms
            .unwrap_or_else(lumiwatch_common::time::now_ms);
        let reading = Reading::new(body.device_id, body.metric, body.value, timestamp_ms);
        match state.ingress.ingest(reading) {
            Ok(()) => accepted += 1,
            Err(e) => {
                tracing::debug!(error = %e, "reading rejected");
                rejected += 1;
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    // A batch with any accepted sample succeeds partially; an all-rejected
    // request is a client error.
    if accepted == 0 {
        if let Some(error) = first_error {
            return Err(bad_request(&error));
        }
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse { accepted, rejected }),
    ))
}

fn bad_request(msg: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: msg.to_string(),
        }),
    )
}
