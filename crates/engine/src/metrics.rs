use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Engine-wide counters, exposed through the query surface and /metrics.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    readings_ingested: AtomicU64,
    readings_rejected: AtomicU64,
    evaluator_dropped: AtomicU64,
    scorer_dropped: AtomicU64,
    triggers_emitted: AtomicU64,
    clears_emitted: AtomicU64,
    anomalies_opened: AtomicU64,
    anomalies_resolved: AtomicU64,
    predictions_computed: AtomicU64,
    scorer_cycles: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_readings_ingested(&self) {
        self.readings_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_readings_rejected(&self) {
        self.readings_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_evaluator_dropped(&self) {
        self.evaluator_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scorer_dropped(&self) {
        self.scorer_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_triggers_emitted(&self) {
        self.triggers_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_clears_emitted(&self) {
        self.clears_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_anomalies_opened(&self) {
        self.anomalies_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_anomalies_resolved(&self) {
        self.anomalies_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_predictions_computed(&self) {
        self.predictions_computed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scorer_cycles(&self) {
        self.scorer_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn readings_ingested_val(&self) -> u64 {
        self.readings_ingested.load(Ordering::Relaxed)
    }

    pub fn readings_rejected_val(&self) -> u64 {
        self.readings_rejected.load(Ordering::Relaxed)
    }

    pub fn evaluator_dropped_val(&self) -> u64 {
        self.evaluator_dropped.load(Ordering::Relaxed)
    }

    pub fn scorer_dropped_val(&self) -> u64 {
        self.scorer_dropped.load(Ordering::Relaxed)
    }

    pub fn triggers_emitted_val(&self) -> u64 {
        self.triggers_emitted.load(Ordering::Relaxed)
    }

    pub fn clears_emitted_val(&self) -> u64 {
        self.clears_emitted.load(Ordering::Relaxed)
    }

    pub fn anomalies_opened_val(&self) -> u64 {
        self.anomalies_opened.load(Ordering::Relaxed)
    }

    pub fn anomalies_resolved_val(&self) -> u64 {
        self.anomalies_resolved.load(Ordering::Relaxed)
    }

    pub fn predictions_computed_val(&self) -> u64 {
        self.predictions_computed.load(Ordering::Relaxed)
    }

    pub fn scorer_cycles_val(&self) -> u64 {
        self.scorer_cycles.load(Ordering::Relaxed)
    }

    pub fn notifications_sent_val(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }

    pub fn notifications_failed_val(&self) -> u64 {
        self.notifications_failed.load(Ordering::Relaxed)
    }
}
