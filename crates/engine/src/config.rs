use std::path::Path;

use serde::Deserialize;

/// Engine tuning knobs, loaded from YAML. Every field has a default so a
/// minimal `{}` document is a valid config.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub ingress: IngressConfig,
    pub evaluator: EvaluatorConfig,
    pub lifecycle: LifecycleConfig,
    pub scorer: ScorerConfig,
    pub notifier: NotifierConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngressConfig {
    /// Samples kept per (device, metric).
    pub history_capacity: usize,
    /// Bounded fan-out queue depth per worker.
    pub queue_capacity: usize,
    /// How far behind a device's last seen timestamp a sample may be.
    pub skew_tolerance_ms: i64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Tolerance for `eq` rule comparisons.
    pub eq_epsilon: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long a cleared condition must stay clear before auto-resolution.
    pub resolve_cooldown_ms: i64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScorerConfig {
    pub interval_ms: u64,
    /// Devices with fewer samples are skipped, not errored.
    pub min_samples: usize,
    /// Failure probability at or above which a prediction opens an anomaly.
    pub alert_probability: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotifierConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub job_timeout_ms: u64,
    /// Webhook endpoint per channel name (email/sms/push), when the hosting
    /// application routes channels over HTTP.
    pub endpoints: std::collections::HashMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ingress: IngressConfig::default(),
            evaluator: EvaluatorConfig::default(),
            lifecycle: LifecycleConfig::default(),
            scorer: ScorerConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            history_capacity: 720,
            queue_capacity: 4096,
            skew_tolerance_ms: 30_000,
        }
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self { eq_epsilon: 1e-6 }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            resolve_cooldown_ms: 300_000,
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            min_samples: 20,
            alert_probability: 80.0,
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 200,
            job_timeout_ms: 10_000,
            endpoints: Default::default(),
        }
    }
}

#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    Validation(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Parse(e) => write!(f, "parse: {e}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_yaml::Error> for LoadError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Parse(e)
    }
}

pub fn load_from_file(path: &Path) -> Result<EngineConfig, LoadError> {
    let contents = std::fs::read_to_string(path)?;
    load_from_str(&contents)
}

pub fn load_from_str(yaml: &str) -> Result<EngineConfig, LoadError> {
    let cfg: EngineConfig = serde_yaml::from_str(yaml)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &EngineConfig) -> Result<(), LoadError> {
    if cfg.ingress.history_capacity == 0 {
        return Err(LoadError::Validation(
            "ingress.history_capacity must be > 0".into(),
        ));
    }
    if cfg.ingress.queue_capacity == 0 {
        return Err(LoadError::Validation(
            "ingress.queue_capacity must be > 0".into(),
        ));
    }
    if cfg.ingress.skew_tolerance_ms < 0 {
        return Err(LoadError::Validation(
            "ingress.skew_tolerance_ms must be >= 0".into(),
        ));
    }
    if !cfg.evaluator.eq_epsilon.is_finite() || cfg.evaluator.eq_epsilon < 0.0 {
        return Err(LoadError::Validation(
            "evaluator.eq_epsilon must be finite and >= 0".into(),
        ));
    }
    if cfg.lifecycle.resolve_cooldown_ms < 0 {
        return Err(LoadError::Validation(
            "lifecycle.resolve_cooldown_ms must be >= 0".into(),
        ));
    }
    if cfg.scorer.interval_ms == 0 {
        return Err(LoadError::Validation("scorer.interval_ms must be > 0".into()));
    }
    if cfg.scorer.min_samples < 2 {
        return Err(LoadError::Validation("scorer.min_samples must be >= 2".into()));
    }
    if !(0.0..=100.0).contains(&cfg.scorer.alert_probability) {
        return Err(LoadError::Validation(
            "scorer.alert_probability must be within 0..=100".into(),
        ));
    }
    if cfg.notifier.max_attempts == 0 {
        return Err(LoadError::Validation(
            "notifier.max_attempts must be > 0".into(),
        ));
    }
    Ok(())
}
