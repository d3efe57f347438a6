use std::sync::Arc;

use dashmap::DashMap;

use super::anomaly::{Anomaly, AnomalySource, AnomalyStatus, LifecycleError};
use crate::evaluator::{RuleEvent, RuleEventKind};
use crate::metrics::EngineMetrics;
use crate::reading::Metric;
use crate::rules::Severity;

#[derive(Clone, Hash, Eq, PartialEq)]
struct OpenKey {
    device_id: String,
    source_key: String,
}

/// What a trigger/clear/tick did to the anomaly table. The runtime uses
/// this to drive persistence and notifications.
#[derive(Debug, Clone)]
pub enum LifecycleUpdate {
    Opened(Anomaly),
    Retriggered(Anomaly),
    CooldownStarted(Anomaly),
}

/// Owns the anomaly state machine and the one-open-anomaly-per-(device,
/// source) invariant. Clear events start a cooldown; `tick` resolves
/// anomalies whose clear outlasted it.
pub struct LifecycleManager {
    anomalies: DashMap<String, Anomaly>,
    open_index: DashMap<OpenKey, String>,
    /// anomaly id -> clear observed at (cooldown running since then)
    cooldowns: DashMap<String, i64>,
    resolve_cooldown_ms: i64,
    metrics: Arc<EngineMetrics>,
}

impl LifecycleManager {
    pub fn new(resolve_cooldown_ms: i64, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            anomalies: DashMap::new(),
            open_index: DashMap::new(),
            cooldowns: DashMap::new(),
            resolve_cooldown_ms,
            metrics,
        }
    }

    pub fn on_event(&self, event: &RuleEvent) -> Option<LifecycleUpdate> {
        match event.kind {
            RuleEventKind::Trigger => Some(self.on_trigger(
                AnomalySource::Rule(event.rule_id.clone()),
                &event.device_id,
                event.metric,
                event.observed_value,
                event.threshold,
                event.severity,
                event.at_ms,
            )),
            RuleEventKind::Clear => self.on_clear(&event.rule_id, &event.device_id, event.at_ms),
        }
    }

    /// Open a new anomaly or refresh the open one for this (device,
    /// source). A re-trigger during cooldown cancels the pending
    /// resolution.
    pub fn on_trigger(
        &self,
        source: AnomalySource,
        device_id: &str,
        metric: Metric,
        observed_value: f64,
        threshold: f64,
        severity: Severity,
        at_ms: i64,
    ) -> LifecycleUpdate {
        let key = OpenKey {
            device_id: device_id.to_string(),
            source_key: source.key(),
        };

        // entry() holds the shard lock, so two concurrent triggers for the
        // same key cannot both open.
        match self.open_index.entry(key) {
            dashmap::Entry::Occupied(mut open) => {
                let id = open.get().clone();
                self.cooldowns.remove(&id);
                match self.anomalies.get_mut(&id) {
                    Some(mut anomaly) => {
                        anomaly.last_updated_at_ms = at_ms;
                        anomaly.observed_value = observed_value;
                        LifecycleUpdate::Retriggered(anomaly.clone())
                    }
                    // Stale index entry: reopen in place.
                    None => {
                        let anomaly = Anomaly {
                            id: lumiwatch_common::id::new_id(),
                            source,
                            device_id: device_id.to_string(),
                            metric,
                            observed_value,
                            threshold,
                            severity,
                            status: AnomalyStatus::Active,
                            first_triggered_at_ms: at_ms,
                            last_updated_at_ms: at_ms,
                            resolved_at_ms: None,
                            resolution_reason: None,
                        };
                        open.insert(anomaly.id.clone());
                        self.anomalies.insert(anomaly.id.clone(), anomaly.clone());
                        self.metrics.inc_anomalies_opened();
                        LifecycleUpdate::Opened(anomaly)
                    }
                }
            }
            dashmap::Entry::Vacant(slot) => {
                let anomaly = Anomaly {
                    id: lumiwatch_common::id::new_id(),
                    source,
                    device_id: device_id.to_string(),
                    metric,
                    observed_value,
                    threshold,
                    severity,
                    status: AnomalyStatus::Active,
                    first_triggered_at_ms: at_ms,
                    last_updated_at_ms: at_ms,
                    resolved_at_ms: None,
                    resolution_reason: None,
                };
                slot.insert(anomaly.id.clone());
                self.anomalies.insert(anomaly.id.clone(), anomaly.clone());
                self.metrics.inc_anomalies_opened();
                LifecycleUpdate::Opened(anomaly)
            }
        }
    }

    fn on_clear(&self, rule_id: &str, device_id: &str, at_ms: i64) -> Option<LifecycleUpdate> {
        let key = OpenKey {
            device_id: device_id.to_string(),
            source_key: rule_id.to_string(),
        };
        let id = self.open_index.get(&key)?.clone();
        self.cooldowns.insert(id.clone(), at_ms);
        let mut anomaly = self.anomalies.get_mut(&id)?;
        anomaly.last_updated_at_ms = at_ms;
        Some(LifecycleUpdate::CooldownStarted(anomaly.clone()))
    }

    /// Resolve every anomaly whose clear has been sustained past the
    /// cooldown. Returns the resolved records for persistence.
    pub fn tick(&self, now_ms: i64) -> Vec<Anomaly> {
        let due: Vec<String> = self
            .cooldowns
            .iter()
            .filter(|e| now_ms - *e.value() >= self.resolve_cooldown_ms)
            .map(|e| e.key().clone())
            .collect();

        let mut resolved = Vec::with_capacity(due.len());
        for id in due {
            self.cooldowns.remove(&id);
            if let Some(anomaly) = self.resolve_internal(&id, now_ms, "condition cleared") {
                resolved.push(anomaly);
            }
        }
        resolved
    }

    fn resolve_internal(&self, id: &str, now_ms: i64, reason: &str) -> Option<Anomaly> {
        let mut anomaly = self.anomalies.get_mut(id)?;
        if anomaly.status == AnomalyStatus::Resolved {
            return None;
        }
        anomaly.status = AnomalyStatus::Resolved;
        anomaly.resolved_at_ms = Some(now_ms);
        anomaly.resolution_reason = Some(reason.to_string());
        anomaly.last_updated_at_ms = now_ms;
        let snapshot = anomaly.clone();
        drop(anomaly);

        self.open_index.remove(&OpenKey {
            device_id: snapshot.device_id.clone(),
            source_key: snapshot.source.key(),
        });
        self.metrics.inc_anomalies_resolved();
        Some(snapshot)
    }

    /// Operator acknowledgement: manual resolution.
    pub fn acknowledge(&self, id: &str, now_ms: i64) -> Result<Anomaly, LifecycleError> {
        self.manual_resolve(id, now_ms, "acknowledged")
    }

    pub fn resolve(&self, id: &str, reason: &str, now_ms: i64) -> Result<Anomaly, LifecycleError> {
        self.manual_resolve(id, now_ms, reason)
    }

    fn manual_resolve(
        &self,
        id: &str,
        now_ms: i64,
        reason: &str,
    ) -> Result<Anomaly, LifecycleError> {
        let status = self.status_of(id)?;
        if status == AnomalyStatus::Resolved {
            return Err(LifecycleError::InvalidTransition {
                id: id.to_string(),
                status,
            });
        }
        self.cooldowns.remove(id);
        self.resolve_internal(id, now_ms, reason)
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))
    }

    pub fn mark_investigating(&self, id: &str, now_ms: i64) -> Result<Anomaly, LifecycleError> {
        let mut anomaly = self
            .anomalies
            .get_mut(id)
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;
        if anomaly.status == AnomalyStatus::Resolved {
            return Err(LifecycleError::InvalidTransition {
                id: id.to_string(),
                status: anomaly.status,
            });
        }
        anomaly.status = AnomalyStatus::Investigating;
        anomaly.last_updated_at_ms = now_ms;
        Ok(anomaly.clone())
    }

    fn status_of(&self, id: &str) -> Result<AnomalyStatus, LifecycleError> {
        self.anomalies
            .get(id)
            .map(|a| a.status)
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<Anomaly> {
        self.anomalies.get(id).map(|a| a.clone())
    }

    pub fn list(&self) -> Vec<Anomaly> {
        self.anomalies.iter().map(|a| a.value().clone()).collect()
    }

    pub fn open_count_for(&self, device_id: &str) -> usize {
        self.open_index
            .iter()
            .filter(|e| e.key().device_id == device_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::RuleEventKind;
    use crate::rules::Channel;

    fn manager(cooldown_ms: i64) -> LifecycleManager {
        LifecycleManager::new(cooldown_ms, EngineMetrics::new())
    }

    fn trigger_event(at_ms: i64) -> RuleEvent {
        RuleEvent {
            kind: RuleEventKind::Trigger,
            rule_id: "r-power".into(),
            device_id: "LAMP_023".into(),
            metric: Metric::Power,
            observed_value: 320.0,
            threshold: 280.0,
            severity: Severity::High,
            channels: vec![Channel::Email],
            at_ms,
        }
    }

    fn clear_event(at_ms: i64) -> RuleEvent {
        RuleEvent {
            kind: RuleEventKind::Clear,
            at_ms,
            ..trigger_event(at_ms)
        }
    }

    #[test]
    fn trigger_opens_active_anomaly() {
        let mgr = manager(1000);
        let update = mgr.on_event(&trigger_event(1000)).unwrap();
        let anomaly = match update {
            LifecycleUpdate::Opened(a) => a,
            other => panic!("expected Opened, got {other:?}"),
        };
        assert_eq!(anomaly.status, AnomalyStatus::Active);
        assert_eq!(anomaly.observed_value, 320.0);
        assert_eq!(anomaly.severity, Severity::High);
    }

    #[test]
    fn retrigger_updates_instead_of_duplicating() {
        let mgr = manager(1000);
        mgr.on_event(&trigger_event(1000));
        let update = mgr.on_event(&trigger_event(2000)).unwrap();
        assert!(matches!(update, LifecycleUpdate::Retriggered(_)));
        assert_eq!(mgr.list().len(), 1);
        assert_eq!(mgr.get(&mgr.list()[0].id).unwrap().last_updated_at_ms, 2000);
    }

    #[test]
    fn clear_then_cooldown_resolves() {
        let mgr = manager(1000);
        mgr.on_event(&trigger_event(1000));
        mgr.on_event(&clear_event(2000));
        assert!(mgr.tick(2500).is_empty());
        let resolved = mgr.tick(3000);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].status, AnomalyStatus::Resolved);
        assert_eq!(resolved[0].resolved_at_ms, Some(3000));
    }

    #[test]
    fn retrigger_during_cooldown_cancels_resolution() {
        let mgr = manager(1000);
        mgr.on_event(&trigger_event(1000));
        mgr.on_event(&clear_event(2000));
        mgr.on_event(&trigger_event(2500));
        assert!(mgr.tick(10_000).is_empty());
        assert!(mgr.list()[0].status.is_open());
    }

    #[test]
    fn new_episode_after_resolution_gets_new_id() {
        let mgr = manager(0);
        mgr.on_event(&trigger_event(1000));
        mgr.on_event(&clear_event(2000));
        let resolved = mgr.tick(2000);
        assert_eq!(resolved.len(), 1);
        let first_id = resolved[0].id.clone();

        mgr.on_event(&trigger_event(3000));
        let ids: Vec<String> = mgr.list().iter().map(|a| a.id.clone()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first_id));
    }

    #[test]
    fn investigating_still_accepts_retrigger() {
        let mgr = manager(1000);
        let LifecycleUpdate::Opened(anomaly) = mgr.on_event(&trigger_event(1000)).unwrap() else {
            panic!("expected Opened");
        };
        mgr.mark_investigating(&anomaly.id, 1500).unwrap();
        let update = mgr.on_event(&trigger_event(2000)).unwrap();
        assert!(matches!(update, LifecycleUpdate::Retriggered(_)));
        assert_eq!(
            mgr.get(&anomaly.id).unwrap().status,
            AnomalyStatus::Investigating
        );
    }

    #[test]
    fn investigating_then_cooldown_resolves() {
        let mgr = manager(1000);
        let LifecycleUpdate::Opened(anomaly) = mgr.on_event(&trigger_event(1000)).unwrap() else {
            panic!("expected Opened");
        };
        mgr.mark_investigating(&anomaly.id, 1500).unwrap();
        mgr.on_event(&clear_event(2000));
        let resolved = mgr.tick(3000);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].status, AnomalyStatus::Resolved);
    }

    #[test]
    fn acknowledge_resolves_manually() {
        let mgr = manager(60_000);
        let LifecycleUpdate::Opened(anomaly) = mgr.on_event(&trigger_event(1000)).unwrap() else {
            panic!("expected Opened");
        };
        let resolved = mgr.acknowledge(&anomaly.id, 2000).unwrap();
        assert_eq!(resolved.status, AnomalyStatus::Resolved);
        assert_eq!(resolved.resolution_reason.as_deref(), Some("acknowledged"));
    }

    #[test]
    fn resolving_resolved_is_invalid_transition() {
        let mgr = manager(0);
        let LifecycleUpdate::Opened(anomaly) = mgr.on_event(&trigger_event(1000)).unwrap() else {
            panic!("expected Opened");
        };
        mgr.resolve(&anomaly.id, "done", 2000).unwrap();
        let err = mgr.resolve(&anomaly.id, "again", 3000).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn unknown_id_is_not_found() {
        let mgr = manager(0);
        assert!(matches!(
            mgr.resolve("ghost", "x", 1000).unwrap_err(),
            LifecycleError::NotFound(_)
        ));
        assert!(matches!(
            mgr.mark_investigating("ghost", 1000).unwrap_err(),
            LifecycleError::NotFound(_)
        ));
        assert!(matches!(
            mgr.acknowledge("ghost", 1000).unwrap_err(),
            LifecycleError::NotFound(_)
        ));
    }

    #[test]
    fn investigating_resolved_is_invalid_transition() {
        let mgr = manager(0);
        let LifecycleUpdate::Opened(anomaly) = mgr.on_event(&trigger_event(1000)).unwrap() else {
            panic!("expected Opened");
        };
        mgr.resolve(&anomaly.id, "done", 2000).unwrap();
        let err = mgr.mark_investigating(&anomaly.id, 3000).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn open_count_tracks_per_device() {
        let mgr = manager(1000);
        mgr.on_event(&trigger_event(1000));
        let mut other = trigger_event(1000);
        other.rule_id = "r-temp".into();
        mgr.on_event(&other);
        assert_eq!(mgr.open_count_for("LAMP_023"), 2);
        assert_eq!(mgr.open_count_for("LAMP_999"), 0);
    }

    #[test]
    fn prediction_source_dedups_separately_from_rules() {
        let mgr = manager(1000);
        mgr.on_trigger(
            AnomalySource::Prediction("led_driver".into()),
            "LAMP_023",
            Metric::Power,
            87.0,
            80.0,
            Severity::High,
            1000,
        );
        let update = mgr.on_trigger(
            AnomalySource::Prediction("led_driver".into()),
            "LAMP_023",
            Metric::Power,
            91.0,
            80.0,
            Severity::High,
            2000,
        );
        assert!(matches!(update, LifecycleUpdate::Retriggered(_)));
        assert_eq!(mgr.list().len(), 1);
    }

    #[test]
    fn clear_without_open_anomaly_is_noop() {
        let mgr = manager(1000);
        assert!(mgr.on_event(&clear_event(1000)).is_none());
    }

    #[test]
    fn parallel_triggers_open_exactly_one_anomaly() {
        let mgr = std::sync::Arc::new(manager(1000));
        let opened = std::sync::atomic::AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for i in 0..64 {
                let mgr = std::sync::Arc::clone(&mgr);
                let opened = &opened;
                scope.spawn(move || {
                    let update = mgr.on_trigger(
                        AnomalySource::Rule("r-power".into()),
                        "LAMP_023",
                        Metric::Power,
                        300.0 + i as f64,
                        280.0,
                        Severity::High,
                        1000 + i,
                    );
                    if matches!(update, LifecycleUpdate::Opened(_)) {
                        opened.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(opened.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(mgr.open_count_for("LAMP_023"), 1);
        assert_eq!(mgr.list().len(), 1);
    }
}
