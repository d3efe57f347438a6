use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;

use crate::reading::{Metric, Reading};

/// Capacity-bounded sample window for one (device, metric). Oldest sample
/// is evicted on overflow.
#[derive(Debug)]
pub struct SampleWindow {
    capacity: usize,
    samples: VecDeque<(i64, f64)>,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    pub fn push(&mut self, timestamp_ms: i64, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((timestamp_ms, value));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<(i64, f64)> {
        self.samples.back().copied()
    }

    /// Oldest-to-newest copy, for trend analysis.
    pub fn values(&self) -> Vec<(i64, f64)> {
        self.samples.iter().copied().collect()
    }
}

#[derive(Clone, Hash, Eq, PartialEq)]
struct HistoryKey {
    device_id: String,
    metric: Metric,
}

/// Rolling reading history for all devices. Memory-only; rebuildable from
/// upstream after a restart.
pub struct HistoryStore {
    windows: Arc<DashMap<HistoryKey, SampleWindow>>,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            capacity,
        }
    }

    pub fn append(&self, reading: &Reading) {
        let key = HistoryKey {
            device_id: reading.device_id.clone(),
            metric: reading.metric,
        };
        self.windows
            .entry(key)
            .or_insert_with(|| SampleWindow::new(self.capacity))
            .push(reading.timestamp_ms, reading.value);
    }

    pub fn last(&self, device_id: &str, metric: Metric) -> Option<(i64, f64)> {
        self.windows
            .get(&HistoryKey {
                device_id: device_id.to_string(),
                metric,
            })
            .and_then(|w| w.last())
    }

    pub fn samples(&self, device_id: &str, metric: Metric) -> Vec<(i64, f64)> {
        self.windows
            .get(&HistoryKey {
                device_id: device_id.to_string(),
                metric,
            })
            .map(|w| w.values())
            .unwrap_or_default()
    }

    pub fn sample_count(&self, device_id: &str, metric: Metric) -> usize {
        self.windows
            .get(&HistoryKey {
                device_id: device_id.to_string(),
                metric,
            })
            .map(|w| w.len())
            .unwrap_or(0)
    }

    /// Distinct device ids currently holding history.
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .windows
            .iter()
            .map(|e| e.key().device_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}
