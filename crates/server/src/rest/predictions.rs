use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use lumiwatch_engine::predictor::Prediction;

use super::AppState;

#[derive(Deserialize)]
pub struct ListPredictionsQuery {
    pub device_id: Option<String>,
}

/// Current predictions, highest failure probability first.
pub async fn list_predictions(
    State(state): State<AppState>,
    Query(q): Query<ListPredictionsQuery>,
) -> Json<Vec<Prediction>> {
    Json(state.query.list_predictions(q.device_id.as_deref()))
}
