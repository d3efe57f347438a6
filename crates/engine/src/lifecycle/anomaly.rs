use serde::{Deserialize, Serialize};

use crate::reading::Metric;
use crate::rules::Severity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum AnomalySource {
    Rule(String),
    Prediction(String),
}

impl AnomalySource {
    /// Dedup key component: one open anomaly per (device, source).
    pub fn key(&self) -> String {
        match self {
            Self::Rule(rule_id) => rule_id.clone(),
            Self::Prediction(component) => format!("prediction:{component}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyStatus {
    Active,
    Investigating,
    Resolved,
}

impl AnomalyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

/// One detected anomaly instance. Resolved is terminal; a fresh violation
/// episode creates a new record with a new id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: String,
    pub source: AnomalySource,
    pub device_id: String,
    pub metric: Metric,
    pub observed_value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub status: AnomalyStatus,
    pub first_triggered_at_ms: i64,
    pub last_updated_at_ms: i64,
    pub resolved_at_ms: Option<i64>,
    pub resolution_reason: Option<String>,
}

#[derive(Debug)]
pub enum LifecycleError {
    NotFound(String),
    InvalidTransition {
        id: String,
        status: AnomalyStatus,
    },
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "anomaly not found: {id}"),
            Self::InvalidTransition { id, status } => {
                write!(f, "invalid transition for {id} in status {}", status.as_str())
            }
        }
    }
}

impl std::error::Error for LifecycleError {}
