use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use lumiwatch_common::time::now_ms;
use lumiwatch_engine::reading::Metric;
use lumiwatch_engine::rules::{AlertRule, Channel, Op, RuleError, RuleFilter, Severity};

use super::AppState;

#[derive(Deserialize)]
pub struct CreateRuleRequest {
    pub metric: Metric,
    pub op: Op,
    pub threshold: f64,
    pub sustain_ms: Option<i64>,
    pub severity: Option<Severity>,
    pub channels: Option<Vec<Channel>>,
    pub enabled: Option<bool>,
}

#[derive(Deserialize)]
pub struct UpdateRuleRequest {
    pub metric: Option<Metric>,
    pub op: Option<Op>,
    pub threshold: Option<f64>,
    pub sustain_ms: Option<i64>,
    pub severity: Option<Severity>,
    pub channels: Option<Vec<Channel>>,
    pub enabled: Option<bool>,
}

#[derive(Deserialize)]
pub struct ListRulesQuery {
    pub metric: Option<Metric>,
    #[serde(default)]
    pub enabled_only: bool,
}

fn rule_status(e: RuleError) -> StatusCode {
    match e {
        RuleError::InvalidRule(_) => StatusCode::BAD_REQUEST,
        RuleError::NotFound(_) => StatusCode::NOT_FOUND,
    }
}

pub async fn list_rules(
    State(state): State<AppState>,
    Query(q): Query<ListRulesQuery>,
) -> Json<Vec<AlertRule>> {
    let mut rules = state.rules.list(RuleFilter {
        metric: q.metric,
        enabled_only: q.enabled_only,
    });
    rules.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms));
    Json(rules)
}

pub async fn get_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> Result<Json<AlertRule>, StatusCode> {
    state
        .rules
        .get(&rule_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn create_rule(
    State(state): State<AppState>,
    Json(body): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<AlertRule>), StatusCode> {
    let now = now_ms();
    let rule = AlertRule {
        id: lumiwatch_common::id::new_id(),
        metric: body.metric,
        op: body.op,
        threshold: body.threshold,
        sustain_ms: body.sustain_ms.unwrap_or(0),
        severity: body.severity.unwrap_or(Severity::Medium),
        enabled: body.enabled.unwrap_or(true),
        channels: body.channels.unwrap_or_else(|| vec![Channel::Email]),
        version: 1,
        created_at_ms: now,
        updated_at_ms: now,
    };
    state.rules.add(rule.clone()).map_err(rule_status)?;
    tracing::info!(rule_id = %rule.id, metric = rule.metric.as_str(), "rule created");
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn update_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
    Json(body): Json<UpdateRuleRequest>,
) -> Result<Json<AlertRule>, StatusCode> {
    let current = state.rules.get(&rule_id).ok_or(StatusCode::NOT_FOUND)?;
    let updated = AlertRule {
        id: current.id.clone(),
        metric: body.metric.unwrap_or(current.metric),
        op: body.op.unwrap_or(current.op),
        threshold: body.threshold.unwrap_or(current.threshold),
        sustain_ms: body.sustain_ms.unwrap_or(current.sustain_ms),
        severity: body.severity.unwrap_or(current.severity),
        enabled: body.enabled.unwrap_or(current.enabled),
        channels: body.channels.unwrap_or(current.channels),
        version: current.version,
        created_at_ms: current.created_at_ms,
        updated_at_ms: current.updated_at_ms,
    };
    let saved = state
        .rules
        .update(updated, now_ms())
        .map_err(rule_status)?;
    tracing::info!(rule_id = %saved.id, version = saved.version, "rule updated");
    Ok(Json(saved))
}

pub async fn disable_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    state
        .rules
        .disable(&rule_id, now_ms())
        .map_err(rule_status)?;
    tracing::info!(rule_id = %rule_id, "rule disabled");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> StatusCode {
    if state.rules.delete(&rule_id) {
        tracing::info!(rule_id = %rule_id, "rule deleted");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
