mod history;
mod queue;

pub use history::{HistoryStore, SampleWindow};
pub use queue::{channel, DropOldestQueue, QueueReceiver};

use std::sync::Arc;

use dashmap::DashMap;

use crate::metrics::EngineMetrics;
use crate::reading::Reading;

#[derive(Debug)]
pub enum IngestError {
    NonFinite { value: f64 },
    StaleTimestamp { timestamp_ms: i64, last_seen_ms: i64 },
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFinite { value } => write!(f, "non-finite value: {value}"),
            Self::StaleTimestamp {
                timestamp_ms,
                last_seen_ms,
            } => write!(
                f,
                "stale timestamp: {timestamp_ms} behind last seen {last_seen_ms}"
            ),
        }
    }
}

impl std::error::Error for IngestError {}

/// Ingestion boundary. Validates each sample, appends it to the rolling
/// history, and fans it out to the evaluator and scorer queues. Never
/// awaits downstream work.
pub struct Ingress {
    history: Arc<HistoryStore>,
    last_seen: DashMap<String, i64>,
    skew_tolerance_ms: i64,
    evaluator_tx: DropOldestQueue<Reading>,
    scorer_tx: DropOldestQueue<Reading>,
    metrics: Arc<EngineMetrics>,
}

impl Ingress {
    pub fn new(
        history: Arc<HistoryStore>,
        skew_tolerance_ms: i64,
        evaluator_tx: DropOldestQueue<Reading>,
        scorer_tx: DropOldestQueue<Reading>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            history,
            last_seen: DashMap::new(),
            skew_tolerance_ms,
            evaluator_tx,
            scorer_tx,
            metrics,
        }
    }

    pub fn ingest(&self, reading: Reading) -> Result<(), IngestError> {
        self.validate(&reading)?;

        self.last_seen
            .entry(reading.device_id.clone())
            .and_modify(|ts| *ts = (*ts).max(reading.timestamp_ms))
            .or_insert(reading.timestamp_ms);
        self.history.append(&reading);

        if self.evaluator_tx.push(reading.clone()) {
            self.metrics.inc_evaluator_dropped();
        }
        if self.scorer_tx.push(reading) {
            self.metrics.inc_scorer_dropped();
        }

        self.metrics.inc_readings_ingested();
        Ok(())
    }

    fn validate(&self, reading: &Reading) -> Result<(), IngestError> {
        if !reading.value.is_finite() {
            self.metrics.inc_readings_rejected();
            return Err(IngestError::NonFinite {
                value: reading.value,
            });
        }
        if let Some(last) = self.last_seen.get(&reading.device_id) {
            let last_seen_ms = *last;
            if reading.timestamp_ms < last_seen_ms - self.skew_tolerance_ms {
                self.metrics.inc_readings_rejected();
                return Err(IngestError::StaleTimestamp {
                    timestamp_ms: reading.timestamp_ms,
                    last_seen_ms,
                });
            }
        }
        Ok(())
    }

    pub fn last_seen_ms(&self, device_id: &str) -> Option<i64> {
        self.last_seen.get(device_id).map(|ts| *ts)
    }

    pub fn evaluator_dropped(&self) -> u64 {
        self.evaluator_tx.dropped_count()
    }

    pub fn scorer_dropped(&self) -> u64 {
        self.scorer_tx.dropped_count()
    }

    pub fn shutdown(&self) {
        self.evaluator_tx.close();
        self.scorer_tx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Metric;

    fn ingress_with_queues(
        skew_ms: i64,
    ) -> (Ingress, QueueReceiver<Reading>, QueueReceiver<Reading>) {
        let (eval_tx, eval_rx) = channel(8);
        let (scorer_tx, scorer_rx) = channel(8);
        let ingress = Ingress::new(
            Arc::new(HistoryStore::new(16)),
            skew_ms,
            eval_tx,
            scorer_tx,
            EngineMetrics::new(),
        );
        (ingress, eval_rx, scorer_rx)
    }

    #[test]
    fn valid_reading_fans_out_to_both_queues() {
        let (ingress, eval_rx, scorer_rx) = ingress_with_queues(1000);
        let r = Reading::new("LAMP_001", Metric::Power, 120.0, 1000);
        ingress.ingest(r.clone()).unwrap();
        assert_eq!(eval_rx.try_recv(), Some(r.clone()));
        assert_eq!(scorer_rx.try_recv(), Some(r));
    }

    #[test]
    fn non_finite_value_rejected_and_counted() {
        let (ingress, eval_rx, _) = ingress_with_queues(1000);
        let err = ingress
            .ingest(Reading::new("LAMP_001", Metric::Power, f64::NAN, 1000))
            .unwrap_err();
        assert!(matches!(err, IngestError::NonFinite { .. }));
        assert_eq!(eval_rx.try_recv(), None);
    }

    #[test]
    fn stale_timestamp_beyond_skew_rejected() {
        let (ingress, _, _) = ingress_with_queues(1000);
        ingress
            .ingest(Reading::new("LAMP_001", Metric::Power, 120.0, 10_000))
            .unwrap();
        let err = ingress
            .ingest(Reading::new("LAMP_001", Metric::Power, 121.0, 8_500))
            .unwrap_err();
        assert!(matches!(err, IngestError::StaleTimestamp { .. }));
    }

    #[test]
    fn small_skew_within_tolerance_accepted() {
        let (ingress, _, _) = ingress_with_queues(1000);
        ingress
            .ingest(Reading::new("LAMP_001", Metric::Power, 120.0, 10_000))
            .unwrap();
        ingress
            .ingest(Reading::new("LAMP_001", Metric::Power, 121.0, 9_500))
            .unwrap();
        // last_seen keeps the max, not the most recent arrival
        assert_eq!(ingress.last_seen_ms("LAMP_001"), Some(10_000));
    }

    #[test]
    fn skew_is_tracked_per_device() {
        let (ingress, _, _) = ingress_with_queues(1000);
        ingress
            .ingest(Reading::new("LAMP_001", Metric::Power, 120.0, 100_000))
            .unwrap();
        // a different device far in the past is fine
        ingress
            .ingest(Reading::new("LAMP_002", Metric::Power, 90.0, 1_000))
            .unwrap();
    }

    #[test]
    fn duplicate_reading_admitted() {
        let (ingress, eval_rx, _) = ingress_with_queues(1000);
        let r = Reading::new("LAMP_001", Metric::Power, 320.0, 5000);
        ingress.ingest(r.clone()).unwrap();
        ingress.ingest(r.clone()).unwrap();
        assert_eq!(eval_rx.try_recv(), Some(r.clone()));
        assert_eq!(eval_rx.try_recv(), Some(r));
    }
}
