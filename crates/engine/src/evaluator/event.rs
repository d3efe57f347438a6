use serde::{Deserialize, Serialize};

use crate::reading::Metric;
use crate::rules::{Channel, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleEventKind {
    Trigger,
    Clear,
}

/// Emitted by the evaluator at episode boundaries; consumed by the
/// lifecycle manager and the notification dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEvent {
    pub kind: RuleEventKind,
    pub rule_id: String,
    pub device_id: String,
    pub metric: Metric,
    pub observed_value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub channels: Vec<Channel>,
    pub at_ms: i64,
}

impl RuleEvent {
    pub fn is_trigger(&self) -> bool {
        self.kind == RuleEventKind::Trigger
    }
}
