use serde::{Deserialize, Serialize};

use crate::lifecycle::Anomaly;
use crate::predictor::Prediction;
use crate::reading::Metric;
use crate::rules::{Channel, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Triggered,
    Cleared,
    Predicted,
}

/// What a channel sender actually delivers. Downstream consumers must
/// tolerate duplicates (delivery is at-least-once).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub anomaly_id: String,
    pub kind: NoticeKind,
    pub device_id: String,
    pub metric: Metric,
    pub severity: Severity,
    pub observed_value: f64,
    pub threshold: f64,
    pub at_ms: i64,
}

impl Notice {
    pub fn triggered(anomaly: &Anomaly) -> Self {
        Self::from_anomaly(anomaly, NoticeKind::Triggered)
    }

    pub fn cleared(anomaly: &Anomaly) -> Self {
        Self::from_anomaly(anomaly, NoticeKind::Cleared)
    }

    fn from_anomaly(anomaly: &Anomaly, kind: NoticeKind) -> Self {
        Self {
            anomaly_id: anomaly.id.clone(),
            kind,
            device_id: anomaly.device_id.clone(),
            metric: anomaly.metric,
            severity: anomaly.severity,
            observed_value: anomaly.observed_value,
            threshold: anomaly.threshold,
            at_ms: anomaly.last_updated_at_ms,
        }
    }

    pub fn predicted(prediction: &Prediction, anomaly_id: &str, severity: Severity) -> Self {
        Self {
            anomaly_id: anomaly_id.to_string(),
            kind: NoticeKind::Predicted,
            device_id: prediction.device_id.clone(),
            metric: prediction.component.primary_metric(),
            severity,
            observed_value: prediction.failure_probability,
            threshold: 0.0,
            at_ms: prediction.generated_at_ms,
        }
    }
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notify: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Transport for one channel, supplied by the hosting application.
#[async_trait::async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError>;
}
