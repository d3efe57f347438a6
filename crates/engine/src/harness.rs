//! Synchronous scenario driver for the detection pipeline. Feeds a
//! scripted sample sequence through the evaluator and lifecycle manager
//! without the async workers, so tests control time exactly.

use std::sync::Arc;

use crate::evaluator::{Evaluator, RuleEvent};
use crate::ingress::HistoryStore;
use crate::lifecycle::{Anomaly, LifecycleManager, LifecycleUpdate};
use crate::metrics::EngineMetrics;
use crate::predictor::{PredictionTable, PredictiveScorer};
use crate::reading::{Metric, Reading};
use crate::rules::{AlertRule, RuleStore};

pub struct Sample {
    pub device_id: String,
    pub metric: Metric,
    pub value: f64,
    pub timestamp_ms: i64,
}

impl Sample {
    pub fn new(device_id: &str, metric: Metric, value: f64, timestamp_ms: i64) -> Self {
        Self {
            device_id: device_id.to_string(),
            metric,
            value,
            timestamp_ms,
        }
    }
}

pub struct HarnessResult {
    pub events: Vec<RuleEvent>,
    pub trigger_count: usize,
    pub clear_count: usize,
    pub resolved: Vec<Anomaly>,
}

pub struct Harness {
    pub rules: Arc<RuleStore>,
    pub history: Arc<HistoryStore>,
    pub evaluator: Evaluator,
    pub lifecycle: Arc<LifecycleManager>,
    pub scorer: PredictiveScorer,
    pub metrics: Arc<EngineMetrics>,
}

impl Harness {
    pub fn new(resolve_cooldown_ms: i64) -> Self {
        let metrics = EngineMetrics::new();
        let rules = Arc::new(RuleStore::new());
        let history = Arc::new(HistoryStore::new(2048));
        let evaluator = Evaluator::new(Arc::clone(&rules), 1e-6, Arc::clone(&metrics));
        let lifecycle = Arc::new(LifecycleManager::new(resolve_cooldown_ms, Arc::clone(&metrics)));
        let scorer = PredictiveScorer::new(
            Arc::clone(&history),
            PredictionTable::new(),
            4,
            Arc::clone(&metrics),
        );
        Self {
            rules,
            history,
            evaluator,
            lifecycle,
            scorer,
            metrics,
        }
    }

    pub fn add_rule(&self, rule: AlertRule) {
        self.rules
            .add(rule)
            .unwrap_or_else(|e| panic!("harness rule rejected: {e}"));
    }

    /// Feed one sample through history, evaluation, and the lifecycle.
    pub fn feed(&self, sample: &Sample) -> Vec<(RuleEvent, Option<LifecycleUpdate>)> {
        let reading = Reading::new(
            &sample.device_id,
            sample.metric,
            sample.value,
            sample.timestamp_ms,
        );
        self.history.append(&reading);
        self.evaluator
            .evaluate(&reading)
            .into_iter()
            .map(|event| {
                let update = self.lifecycle.on_event(&event);
                (event, update)
            })
            .collect()
    }

    /// Advance the clock: resolve anomalies whose cooldown has elapsed.
    pub fn advance(&self, now_ms: i64) -> Vec<Anomaly> {
        self.lifecycle.tick(now_ms)
    }

    /// Run a whole scripted sequence, ticking the lifecycle after each
    /// sample's timestamp.
    pub fn run(&self, samples: &[Sample]) -> HarnessResult {
        let mut events = Vec::new();
        let mut resolved = Vec::new();
        for sample in samples {
            for (event, _update) in self.feed(sample) {
                events.push(event);
            }
            resolved.extend(self.advance(sample.timestamp_ms));
        }

        let trigger_count = events.iter().filter(|e| e.is_trigger()).count();
        let clear_count = events.len() - trigger_count;
        HarnessResult {
            events,
            trigger_count,
            clear_count,
            resolved,
        }
    }
}
