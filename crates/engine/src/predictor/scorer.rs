use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::component::Component;
use super::trend::{self, Trend};
use crate::ingress::HistoryStore;
use crate::metrics::EngineMetrics;

/// Failure estimate for one (device, component). Superseded wholesale
/// each scoring cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub device_id: String,
    pub component: Component,
    /// 0..=100
    pub failure_probability: f64,
    pub days_to_failure: i64,
    /// 0..=100, from sample count and trend stability.
    pub confidence: f64,
    pub generated_at_ms: i64,
}

/// Current prediction per (device, component). A cycle replaces each entry
/// with a single insert, so readers see the old record or the new one,
/// never a gap.
#[derive(Clone, Default)]
pub struct PredictionTable {
    entries: Arc<DashMap<(String, Component), Prediction>>,
}

impl PredictionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, prediction: Prediction) {
        self.entries.insert(
            (prediction.device_id.clone(), prediction.component),
            prediction,
        );
    }

    pub fn get(&self, device_id: &str, component: Component) -> Option<Prediction> {
        self.entries
            .get(&(device_id.to_string(), component))
            .map(|p| p.clone())
    }

    pub fn list(&self, device_id: Option<&str>) -> Vec<Prediction> {
        let mut out: Vec<Prediction> = self
            .entries
            .iter()
            .filter(|e| device_id.is_none_or(|d| e.key().0 == d))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| {
            b.failure_probability
                .partial_cmp(&a.failure_probability)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

/// Computes failure scores from reading history on a fixed cadence,
/// independent of the threshold evaluator.
pub struct PredictiveScorer {
    history: Arc<HistoryStore>,
    table: PredictionTable,
    min_samples: usize,
    metrics: Arc<EngineMetrics>,
}

impl PredictiveScorer {
    pub fn new(
        history: Arc<HistoryStore>,
        table: PredictionTable,
        min_samples: usize,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            history,
            table,
            min_samples,
            metrics,
        }
    }

    /// One full pass over all known devices. `should_stop` is checked
    /// between devices so shutdown never waits for a whole pass.
    pub fn run_cycle<F>(&self, now_ms: i64, should_stop: F) -> Vec<Prediction>
    where
        F: Fn() -> bool,
    {
        let mut computed = Vec::new();
        for device_id in self.history.device_ids() {
            if should_stop() {
                tracing::debug!("scorer cycle interrupted before {device_id}");
                break;
            }
            computed.extend(self.score_device(&device_id, now_ms));
        }
        self.metrics.inc_scorer_cycles();
        computed
    }

    /// Score every component of one device. Components without enough
    /// history are skipped, not errored.
    pub fn score_device(&self, device_id: &str, now_ms: i64) -> Vec<Prediction> {
        let mut out = Vec::new();

        for component in Component::ALL {
            // A component is judged by its worst-trending metric.
            let worst = component
                .metrics()
                .iter()
                .filter_map(|metric| {
                    let samples = self.history.samples(device_id, *metric);
                    if samples.len() < self.min_samples {
                        return None;
                    }
                    trend::analyze(&samples)
                })
                .max_by(|a, b| {
                    score_probability(a)
                        .partial_cmp(&score_probability(b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

            let Some(trend) = worst else {
                continue;
            };

            let prediction = Prediction {
                id: lumiwatch_common::id::new_id(),
                device_id: device_id.to_string(),
                component,
                failure_probability: score_probability(&trend),
                days_to_failure: score_days_to_failure(&trend),
                confidence: score_confidence(&trend),
                generated_at_ms: now_ms,
            };
            self.table.replace(prediction.clone());
            self.metrics.inc_predictions_computed();
            out.push(prediction);
        }

        out
    }

    pub fn table(&self) -> &PredictionTable {
        &self.table
    }
}

/// Deviation level plus a week of projected growth, squashed into 0..=100.
/// Monotonic: more deviation or steeper growth always scores higher.
fn score_probability(trend: &Trend) -> f64 {
    let growth = trend.slope_per_day.max(0.0);
    let raw = trend.current_deviation + 7.0 * growth;
    100.0 * raw / (1.0 + raw)
}

/// Days until the normalized deviation would reach 1.0 (fully departed
/// from baseline) at the current growth rate. Clamped to 1..=365.
fn score_days_to_failure(trend: &Trend) -> i64 {
    let growth = trend.slope_per_day.max(0.0);
    if growth < 1e-9 {
        return 365;
    }
    let remaining = (1.0 - trend.current_deviation).max(0.0);
    ((remaining / growth).ceil() as i64).clamp(1, 365)
}

/// Sample-count factor damped by fit noise.
fn score_confidence(trend: &Trend) -> f64 {
    let count_factor = trend.samples as f64 / (trend.samples as f64 + 20.0);
    let stability = 1.0 / (1.0 + 10.0 * trend.residual_variance);
    100.0 * count_factor * stability
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{Metric, Reading};

    const HOUR_MS: i64 = 3_600_000;

    fn history_with(device: &str, metric: Metric, values: &[f64]) -> Arc<HistoryStore> {
        let history = Arc::new(HistoryStore::new(256));
        for (i, v) in values.iter().enumerate() {
            history.append(&Reading::new(device, metric, *v, i as i64 * HOUR_MS));
        }
        history
    }

    fn scorer(history: Arc<HistoryStore>, min_samples: usize) -> PredictiveScorer {
        PredictiveScorer::new(history, PredictionTable::new(), min_samples, EngineMetrics::new())
    }

    #[test]
    fn insufficient_history_emits_nothing() {
        let history = history_with("LAMP_001", Metric::Power, &[120.0; 5]);
        let s = scorer(history, 20);
        assert!(s.score_device("LAMP_001", 0).is_empty());
        assert_eq!(s.table().count(), 0);
    }

    #[test]
    fn drifting_power_scores_led_driver() {
        let values: Vec<f64> = (0..48).map(|i| 120.0 + i as f64 * 4.0).collect();
        let history = history_with("LAMP_023", Metric::Power, &values);
        let s = scorer(history, 20);

        let predictions = s.score_device("LAMP_023", 1_700_000_000_000);
        assert_eq!(predictions.len(), 1);
        let p = &predictions[0];
        assert_eq!(p.component, Component::LedDriver);
        assert!(p.failure_probability > 40.0);
        assert!(p.days_to_failure < 365);
        assert!(p.confidence > 0.0);
    }

    #[test]
    fn stable_device_scores_low() {
        let history = history_with("LAMP_001", Metric::Power, &[120.0; 48]);
        let s = scorer(history, 20);
        let predictions = s.score_device("LAMP_001", 0);
        assert_eq!(predictions.len(), 1);
        assert!(predictions[0].failure_probability < 5.0);
        assert_eq!(predictions[0].days_to_failure, 365);
    }

    #[test]
    fn steeper_drift_means_higher_probability_fewer_days() {
        let slow: Vec<f64> = (0..48).map(|i| 120.0 + i as f64).collect();
        let fast: Vec<f64> = (0..48).map(|i| 120.0 + i as f64 * 8.0).collect();

        let s_slow = scorer(history_with("L1", Metric::Power, &slow), 20);
        let s_fast = scorer(history_with("L2", Metric::Power, &fast), 20);
        let p_slow = &s_slow.score_device("L1", 0)[0];
        let p_fast = &s_fast.score_device("L2", 0)[0];

        assert!(p_fast.failure_probability > p_slow.failure_probability);
        assert!(p_fast.days_to_failure <= p_slow.days_to_failure);
    }

    #[test]
    fn replacement_keeps_one_prediction_per_component() {
        let values: Vec<f64> = (0..48).map(|i| 120.0 + i as f64).collect();
        let history = history_with("LAMP_001", Metric::Power, &values);
        let s = scorer(history.clone(), 20);

        s.score_device("LAMP_001", 1000);
        let first = s.table().get("LAMP_001", Component::LedDriver).unwrap();

        s.score_device("LAMP_001", 2000);
        let second = s.table().get("LAMP_001", Component::LedDriver).unwrap();

        assert_eq!(s.table().list(Some("LAMP_001")).len(), 1);
        assert_ne!(first.id, second.id);
        assert_eq!(second.generated_at_ms, 2000);
    }

    #[test]
    fn cycle_checkpoint_stops_between_devices() {
        let history = Arc::new(HistoryStore::new(256));
        for device in ["LAMP_001", "LAMP_002", "LAMP_003"] {
            for i in 0..48 {
                history.append(&Reading::new(device, Metric::Power, 120.0, i * HOUR_MS));
            }
        }
        let s = scorer(history, 20);
        let computed = s.run_cycle(0, || true);
        assert!(computed.is_empty());
    }

    #[test]
    fn full_cycle_covers_all_devices() {
        let history = Arc::new(HistoryStore::new(256));
        for device in ["LAMP_001", "LAMP_002"] {
            for i in 0..48 {
                history.append(&Reading::new(device, Metric::Power, 120.0, i * HOUR_MS));
            }
        }
        let s = scorer(history, 20);
        let computed = s.run_cycle(0, || false);
        assert_eq!(computed.len(), 2);
    }

    #[test]
    fn confidence_rises_with_samples_and_falls_with_noise() {
        let short: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let long: Vec<f64> = (0..200).map(|i| 100.0 + i as f64).collect();
        let s_short = scorer(history_with("L1", Metric::Power, &short), 10);
        let s_long = scorer(history_with("L2", Metric::Power, &long), 10);
        let c_short = s_short.score_device("L1", 0)[0].confidence;
        let c_long = s_long.score_device("L2", 0)[0].confidence;
        assert!(c_long > c_short);

        let noisy: Vec<f64> = (0..200)
            .map(|i| 100.0 + i as f64 + if i % 2 == 0 { 80.0 } else { -80.0 })
            .collect();
        let s_noisy = scorer(history_with("L3", Metric::Power, &noisy), 10);
        let c_noisy = s_noisy.score_device("L3", 0)[0].confidence;
        assert!(c_noisy < c_long);
    }
}
