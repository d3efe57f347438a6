mod episode;
mod event;

pub use episode::EpisodeState;
pub use event::{RuleEvent, RuleEventKind};

use std::sync::Arc;

use dashmap::DashMap;

use crate::metrics::EngineMetrics;
use crate::reading::Reading;
use crate::rules::RuleStore;

#[derive(Clone, Hash, Eq, PartialEq)]
struct EpisodeKey {
    device_id: String,
    rule_id: String,
}

#[derive(Clone, Copy)]
struct TrackedEpisode {
    state: EpisodeState,
    rule_version: u64,
}

/// Evaluates each incoming reading against the enabled rules for its
/// metric. Episode state is keyed per (device, rule); readings for one
/// device must arrive in order (the runtime serializes them through a
/// single worker).
pub struct Evaluator {
    rules: Arc<RuleStore>,
    episodes: DashMap<EpisodeKey, TrackedEpisode>,
    eq_epsilon: f64,
    metrics: Arc<EngineMetrics>,
}

impl Evaluator {
    pub fn new(rules: Arc<RuleStore>, eq_epsilon: f64, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            rules,
            episodes: DashMap::new(),
            eq_epsilon,
            metrics,
        }
    }

    pub fn evaluate(&self, reading: &Reading) -> Vec<RuleEvent> {
        let mut events = Vec::new();

        for rule in self.rules.matching(reading.metric) {
            let key = EpisodeKey {
                device_id: reading.device_id.clone(),
                rule_id: rule.id.clone(),
            };

            let current = match self.episodes.get(&key) {
                // A rule update invalidates the in-flight window.
                Some(t) if t.rule_version != rule.version => EpisodeState::Idle,
                Some(t) => t.state,
                None => EpisodeState::Idle,
            };

            let violating = rule.op.evaluate(reading.value, rule.threshold, self.eq_epsilon);
            let next = current.transition(violating, reading.timestamp_ms, rule.sustain_ms);
            self.episodes.insert(
                key,
                TrackedEpisode {
                    state: next,
                    rule_version: rule.version,
                },
            );

            if next.is_triggered() && !current.is_triggered() {
                self.metrics.inc_triggers_emitted();
                events.push(RuleEvent {
                    kind: RuleEventKind::Trigger,
                    rule_id: rule.id.clone(),
                    device_id: reading.device_id.clone(),
                    metric: reading.metric,
                    observed_value: reading.value,
                    threshold: rule.threshold,
                    severity: rule.severity,
                    channels: rule.channels.clone(),
                    at_ms: reading.timestamp_ms,
                });
            }

            if next.just_cleared() {
                self.metrics.inc_clears_emitted();
                events.push(RuleEvent {
                    kind: RuleEventKind::Clear,
                    rule_id: rule.id,
                    device_id: reading.device_id.clone(),
                    metric: reading.metric,
                    observed_value: reading.value,
                    threshold: rule.threshold,
                    severity: rule.severity,
                    channels: rule.channels,
                    at_ms: reading.timestamp_ms,
                });
            }
        }

        events
    }

    /// Drop episode state whose rule no longer exists, so deleted rules
    /// do not pin per-device windows forever. The runtime calls this
    /// periodically from the evaluator worker.
    pub fn prune_stale_episodes(&self) -> usize {
        let before = self.episodes.len();
        self.episodes
            .retain(|key, _| self.rules.get(&key.rule_id).is_some());
        before - self.episodes.len()
    }

    pub fn episode_count(&self) -> usize {
        self.episodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Metric;
    use crate::rules::{AlertRule, Channel, Op, Severity};

    fn power_rule(sustain_ms: i64) -> AlertRule {
        AlertRule {
            id: "r-power".into(),
            metric: Metric::Power,
            op: Op::Gt,
            threshold: 280.0,
            sustain_ms,
            severity: Severity::High,
            enabled: true,
            channels: vec![Channel::Email],
            version: 1,
            created_at_ms: 0,
            updated_at_ms: 0,
        }
    }

    fn evaluator_with(rule: AlertRule) -> (Evaluator, Arc<RuleStore>) {
        let store = Arc::new(RuleStore::new());
        store.add(rule).unwrap();
        let eval = Evaluator::new(store.clone(), 1e-6, EngineMetrics::new());
        (eval, store)
    }

    fn power(value: f64, ts: i64) -> Reading {
        Reading::new("LAMP_023", Metric::Power, value, ts)
    }

    #[test]
    fn triggers_on_first_violation_with_zero_sustain() {
        let (eval, _) = evaluator_with(power_rule(0));
        let events = eval.evaluate(&power(320.0, 1000));
        assert_eq!(events.len(), 1);
        assert!(events[0].is_trigger());
        assert_eq!(events[0].observed_value, 320.0);
        assert_eq!(events[0].severity, Severity::High);
    }

    #[test]
    fn one_trigger_per_continuous_episode() {
        let (eval, _) = evaluator_with(power_rule(0));
        assert_eq!(eval.evaluate(&power(320.0, 1000)).len(), 1);
        assert!(eval.evaluate(&power(330.0, 2000)).is_empty());
        assert!(eval.evaluate(&power(340.0, 3000)).is_empty());
    }

    #[test]
    fn compliant_sample_emits_clear() {
        let (eval, _) = evaluator_with(power_rule(0));
        eval.evaluate(&power(320.0, 1000));
        let events = eval.evaluate(&power(260.0, 2000));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RuleEventKind::Clear);
    }

    #[test]
    fn episode_boundary_allows_second_trigger() {
        let (eval, _) = evaluator_with(power_rule(0));
        assert_eq!(eval.evaluate(&power(320.0, 1000)).len(), 1);
        assert_eq!(eval.evaluate(&power(260.0, 2000)).len(), 1); // clear
        let second = eval.evaluate(&power(320.0, 3000));
        assert_eq!(second.len(), 1);
        assert!(second[0].is_trigger());
    }

    #[test]
    fn sustain_window_delays_trigger() {
        let (eval, _) = evaluator_with(power_rule(5000));
        assert!(eval.evaluate(&power(320.0, 1000)).is_empty());
        assert!(eval.evaluate(&power(320.0, 3000)).is_empty());
        let events = eval.evaluate(&power(320.0, 6000));
        assert_eq!(events.len(), 1);
        assert!(events[0].is_trigger());
    }

    #[test]
    fn compliant_sample_resets_sustain_window() {
        let (eval, _) = evaluator_with(power_rule(5000));
        eval.evaluate(&power(320.0, 1000));
        eval.evaluate(&power(260.0, 2000)); // resets, no clear (never triggered)
        assert!(eval.evaluate(&power(320.0, 6500)).is_empty());
        assert_eq!(eval.evaluate(&power(320.0, 12_000)).len(), 1);
    }

    #[test]
    fn duplicate_violating_sample_does_not_retrigger() {
        let (eval, _) = evaluator_with(power_rule(0));
        assert_eq!(eval.evaluate(&power(320.0, 1000)).len(), 1);
        assert!(eval.evaluate(&power(320.0, 1000)).is_empty());
    }

    #[test]
    fn rule_update_discards_inflight_window() {
        let rule = power_rule(5000);
        let (eval, store) = evaluator_with(rule.clone());
        eval.evaluate(&power(320.0, 1000)); // pending

        let mut changed = rule;
        changed.threshold = 300.0;
        store.update(changed, 2000).unwrap();

        // Would have sustained past 5000ms under the old window, but the
        // update reset it; the new window starts here.
        assert!(eval.evaluate(&power(320.0, 7000)).is_empty());
        assert_eq!(eval.evaluate(&power(320.0, 12_000)).len(), 1);
    }

    #[test]
    fn devices_track_independent_episodes() {
        let (eval, _) = evaluator_with(power_rule(0));
        let a = Reading::new("LAMP_001", Metric::Power, 320.0, 1000);
        let b = Reading::new("LAMP_002", Metric::Power, 320.0, 1000);
        assert_eq!(eval.evaluate(&a).len(), 1);
        assert_eq!(eval.evaluate(&b).len(), 1);
    }

    #[test]
    fn disabled_rule_is_ignored() {
        let mut rule = power_rule(0);
        rule.enabled = false;
        let (eval, _) = evaluator_with(rule);
        assert!(eval.evaluate(&power(320.0, 1000)).is_empty());
    }

    #[test]
    fn deleted_rule_episodes_are_pruned() {
        let (eval, store) = evaluator_with(power_rule(0));
        eval.evaluate(&power(320.0, 1000));
        assert_eq!(eval.episode_count(), 1);

        assert!(store.delete("r-power"));
        assert_eq!(eval.prune_stale_episodes(), 1);
        assert_eq!(eval.episode_count(), 0);
    }

    #[test]
    fn prune_keeps_episodes_for_live_rules() {
        let (eval, store) = evaluator_with(power_rule(0));
        let mut other = power_rule(0);
        other.id = "r-power-2".into();
        store.add(other).unwrap();

        eval.evaluate(&power(320.0, 1000));
        assert_eq!(eval.episode_count(), 2);

        store.delete("r-power-2");
        assert_eq!(eval.prune_stale_episodes(), 1);
        assert_eq!(eval.episode_count(), 1);
    }

    #[test]
    fn eq_rule_uses_epsilon() {
        let mut rule = power_rule(0);
        rule.op = Op::Eq;
        rule.threshold = 0.0;
        let (eval, _) = evaluator_with(rule);
        let events = eval.evaluate(&power(5e-7, 1000));
        assert_eq!(events.len(), 1);
    }
}
