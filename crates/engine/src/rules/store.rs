use std::sync::Arc;

use dashmap::DashMap;

use super::rule::{AlertRule, RuleError};
use crate::reading::Metric;

/// Optional list filters, matching the query-boundary contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleFilter {
    pub metric: Option<Metric>,
    pub enabled_only: bool,
}

/// Active alert rules, keyed by id. Mutations go through `add` / `update` /
/// `disable`; the evaluator never writes here.
#[derive(Clone, Default)]
pub struct RuleStore {
    rules: Arc<DashMap<String, AlertRule>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, rule: AlertRule) -> Result<(), RuleError> {
        rule.validate()?;
        self.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    /// Replaces an existing rule, bumping its version so the evaluator
    /// discards in-flight sustain windows for the old definition.
    pub fn update(&self, mut rule: AlertRule, now_ms: i64) -> Result<AlertRule, RuleError> {
        rule.validate()?;
        let mut entry = self
            .rules
            .get_mut(&rule.id)
            .ok_or_else(|| RuleError::NotFound(rule.id.clone()))?;
        rule.version = entry.version + 1;
        rule.created_at_ms = entry.created_at_ms;
        rule.updated_at_ms = now_ms;
        *entry = rule.clone();
        Ok(rule)
    }

    pub fn disable(&self, id: &str, now_ms: i64) -> Result<(), RuleError> {
        let mut entry = self
            .rules
            .get_mut(id)
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;
        entry.enabled = false;
        entry.version += 1;
        entry.updated_at_ms = now_ms;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> bool {
        self.rules.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<AlertRule> {
        self.rules.get(id).map(|r| r.clone())
    }

    pub fn list(&self, filter: RuleFilter) -> Vec<AlertRule> {
        self.rules
            .iter()
            .filter(|r| filter.metric.is_none_or(|m| r.metric == m))
            .filter(|r| !filter.enabled_only || r.enabled)
            .map(|r| r.value().clone())
            .collect()
    }

    /// Enabled rules applicable to one metric, snapshotted for evaluation.
    pub fn matching(&self, metric: Metric) -> Vec<AlertRule> {
        self.list(RuleFilter {
            metric: Some(metric),
            enabled_only: true,
        })
    }

    pub fn count(&self) -> usize {
        self.rules.len()
    }
}
