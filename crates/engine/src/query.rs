//! Read-only views over the live engine state, consumed by the REST layer.

use std::sync::Arc;

use serde::Serialize;

use crate::ingress::{HistoryStore, Ingress};
use crate::lifecycle::{Anomaly, AnomalyStatus, LifecycleManager};
use crate::metrics::EngineMetrics;
use crate::notifier::{JobLog, NotificationJob};
use crate::predictor::{Prediction, PredictionTable};
use crate::reading::Metric;
use crate::rules::Severity;

#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyFilter {
    pub status: Option<AnomalyStatus>,
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    pub metric: Metric,
    pub unit: &'static str,
    pub value: f64,
    pub timestamp_ms: i64,
}

/// Latest known state of one device, assembled from the sample history and
/// the anomaly table.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub device_id: String,
    pub last_seen_ms: Option<i64>,
    pub metrics: Vec<MetricSnapshot>,
    pub open_anomalies: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestStats {
    pub readings_ingested: u64,
    pub readings_rejected: u64,
    pub evaluator_dropped: u64,
    pub scorer_dropped: u64,
    pub triggers_emitted: u64,
    pub clears_emitted: u64,
    pub anomalies_opened: u64,
    pub anomalies_resolved: u64,
    pub predictions_computed: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
}

pub struct QueryService {
    ingress: Arc<Ingress>,
    history: Arc<HistoryStore>,
    lifecycle: Arc<LifecycleManager>,
    predictions: PredictionTable,
    jobs: JobLog,
    metrics: Arc<EngineMetrics>,
}

impl QueryService {
    pub fn new(
        ingress: Arc<Ingress>,
        history: Arc<HistoryStore>,
        lifecycle: Arc<LifecycleManager>,
        predictions: PredictionTable,
        jobs: JobLog,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            ingress,
            history,
            lifecycle,
            predictions,
            jobs,
            metrics,
        }
    }

    /// Anomalies matching the filter, newest first.
    pub fn list_anomalies(&self, filter: AnomalyFilter) -> Vec<Anomaly> {
        let mut out: Vec<Anomaly> = self
            .lifecycle
            .list()
            .into_iter()
            .filter(|a| filter.status.is_none_or(|s| a.status == s))
            .filter(|a| filter.severity.is_none_or(|s| a.severity == s))
            .collect();
        out.sort_by(|a, b| b.first_triggered_at_ms.cmp(&a.first_triggered_at_ms));
        out
    }

    pub fn get_anomaly(&self, id: &str) -> Option<Anomaly> {
        self.lifecycle.get(id)
    }

    pub fn list_predictions(&self, device_id: Option<&str>) -> Vec<Prediction> {
        self.predictions.list(device_id)
    }

    pub fn device_snapshot(&self, device_id: &str) -> Option<DeviceSnapshot> {
        let last_seen_ms = self.ingress.last_seen_ms(device_id);
        last_seen_ms?;

        let mut metrics = Vec::new();
        for metric in Metric::ALL {
            if let Some((timestamp_ms, value)) = self.history.last(device_id, metric) {
                metrics.push(MetricSnapshot {
                    metric,
                    unit: metric.unit(),
                    value,
                    timestamp_ms,
                });
            }
        }

        Some(DeviceSnapshot {
            device_id: device_id.to_string(),
            last_seen_ms,
            metrics,
            open_anomalies: self.lifecycle.open_count_for(device_id),
        })
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.history.device_ids()
    }

    /// Terminally failed notification jobs, newest first.
    pub fn failed_notifications(&self) -> Vec<NotificationJob> {
        self.jobs.failed()
    }

    pub fn ingest_stats(&self) -> IngestStats {
        IngestStats {
            readings_ingested: self.metrics.readings_ingested_val(),
            readings_rejected: self.metrics.readings_rejected_val(),
            evaluator_dropped: self.ingress.evaluator_dropped(),
            scorer_dropped: self.ingress.scorer_dropped(),
            triggers_emitted: self.metrics.triggers_emitted_val(),
            clears_emitted: self.metrics.clears_emitted_val(),
            anomalies_opened: self.metrics.anomalies_opened_val(),
            anomalies_resolved: self.metrics.anomalies_resolved_val(),
            predictions_computed: self.metrics.predictions_computed_val(),
            notifications_sent: self.metrics.notifications_sent_val(),
            notifications_failed: self.metrics.notifications_failed_val(),
        }
    }
}
