use serde::{Deserialize, Serialize};

use crate::reading::Metric;

/// A configured alert rule. Owned by the rule store; the evaluator only
/// ever reads snapshots of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub metric: Metric,
    pub op: Op,
    pub threshold: f64,
    /// Continuous violation required before a trigger. Zero fires on the
    /// first violating sample.
    pub sustain_ms: i64,
    pub severity: Severity,
    pub enabled: bool,
    pub channels: Vec<Channel>,
    /// Bumped on every update; in-flight sustain windows for an older
    /// version are discarded by the evaluator.
    pub version: u64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Gt,
    Lt,
    Eq,
}

impl Op {
    /// `Gt`/`Lt` are strict; `Eq` tolerates `epsilon` to avoid exact float
    /// matching.
    pub fn evaluate(&self, value: f64, threshold: f64, epsilon: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Lt => value < threshold,
            Self::Eq => (value - threshold).abs() <= epsilon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Notification targets a rule can fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
        }
    }
}

#[derive(Debug)]
pub enum RuleError {
    InvalidRule(String),
    NotFound(String),
}

impl std::fmt::Display for RuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRule(msg) => write!(f, "invalid rule: {msg}"),
            Self::NotFound(id) => write!(f, "rule not found: {id}"),
        }
    }
}

impl std::error::Error for RuleError {}

impl AlertRule {
    pub fn validate(&self) -> Result<(), RuleError> {
        if !self.threshold.is_finite() {
            return Err(RuleError::InvalidRule("threshold must be finite".into()));
        }
        if self.sustain_ms < 0 {
            return Err(RuleError::InvalidRule("sustain_ms must be >= 0".into()));
        }
        Ok(())
    }
}
