//! End-to-end pipeline tests: scripted readings through the harness, plus
//! the async runtime with a capturing notification sender.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lumiwatch_engine::config::EngineConfig;
use lumiwatch_engine::harness::{Harness, Sample};
use lumiwatch_engine::lifecycle::AnomalyStatus;
use lumiwatch_engine::notifier::{ChannelSender, Notice, NoticeKind, NotifyError};
use lumiwatch_engine::reading::{Metric, Reading};
use lumiwatch_engine::rules::{AlertRule, Channel, Op, Severity};
use lumiwatch_engine::runtime::{Engine, Persistence};

fn power_rule(id: &str, sustain_ms: i64) -> AlertRule {
    AlertRule {
        id: id.to_string(),
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

#[test]
fn immediate_breach_opens_active_high_anomaly() {
    let h = Harness::new(300_000);
    h.add_rule(power_rule("r-power", 0));

    let updates = h.feed(&Sample::new("LAMP_023", Metric::Power, 320.0, 1_000));
    assert_eq!(updates.len(), 1);

    let anomalies = h.lifecycle.list();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].status, AnomalyStatus::Active);
    assert_eq!(anomalies[0].severity, Severity::High);
    assert_eq!(anomalies[0].observed_value, 320.0);
    assert_eq!(anomalies[0].device_id, "LAMP_023");
}

#[test]
fn compliant_sample_splits_episodes_into_two_anomalies() {
    // Cooldown short enough that the first episode resolves before the
    // second breach arrives.
    let h = Harness::new(1_000);
    h.add_rule(power_rule("r-power", 0));

    h.feed(&Sample::new("LAMP_023", Metric::Power, 320.0, 1_000));
    h.feed(&Sample::new("LAMP_023", Metric::Power, 260.0, 2_000));
    h.advance(10_000);
    h.feed(&Sample::new("LAMP_023", Metric::Power, 320.0, 11_000));

    let anomalies = h.lifecycle.list();
    assert_eq!(anomalies.len(), 2);
    assert_ne!(anomalies[0].id, anomalies[1].id);

    let open: Vec<_> = anomalies.iter().filter(|a| a.status.is_open()).collect();
    assert_eq!(open.len(), 1);
}

#[test]
fn investigating_anomaly_still_auto_resolves_after_cooldown() {
    let h = Harness::new(5_000);
    h.add_rule(power_rule("r-power", 0));

    h.feed(&Sample::new("LAMP_023", Metric::Power, 320.0, 1_000));
    let id = h.lifecycle.list()[0].id.clone();

    h.lifecycle.mark_investigating(&id, 2_000).unwrap();
    assert_eq!(
        h.lifecycle.get(&id).unwrap().status,
        AnomalyStatus::Investigating
    );

    h.feed(&Sample::new("LAMP_023", Metric::Power, 100.0, 3_000));
    assert!(h.advance(7_000).is_empty());

    let resolved = h.advance(8_000);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].status, AnomalyStatus::Resolved);
    assert_eq!(
        resolved[0].resolution_reason.as_deref(),
        Some("condition cleared")
    );
}

#[test]
fn short_history_yields_no_predictions() {
    let h = Harness::new(300_000);
    for i in 0..2 {
        h.feed(&Sample::new(
            "LAMP_001",
            Metric::Power,
            120.0,
            1_000 + i * 1_000,
        ));
    }

    let predictions = h.scorer.run_cycle(10_000, || false);
    assert!(predictions.is_empty());
    assert_eq!(h.scorer.table().count(), 0);
}

#[test]
fn duplicate_samples_do_not_retrigger_within_episode() {
    let h = Harness::new(300_000);
    h.add_rule(power_rule("r-power", 0));

    let sample = Sample::new("LAMP_023", Metric::Power, 320.0, 1_000);
    h.feed(&sample);
    h.feed(&sample);
    h.feed(&sample);

    assert_eq!(h.lifecycle.list().len(), 1);
}

#[test]
fn retrigger_during_cooldown_keeps_one_anomaly() {
    let h = Harness::new(60_000);
    h.add_rule(power_rule("r-power", 0));

    h.feed(&Sample::new("LAMP_023", Metric::Power, 320.0, 1_000));
    h.feed(&Sample::new("LAMP_023", Metric::Power, 260.0, 2_000));
    // Breach again before the cooldown has elapsed.
    h.feed(&Sample::new("LAMP_023", Metric::Power, 330.0, 3_000));

    assert!(h.advance(100_000).is_empty());
    let anomalies = h.lifecycle.list();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].status, AnomalyStatus::Active);
    assert_eq!(anomalies[0].observed_value, 330.0);
}

#[test]
fn rule_update_restarts_inflight_sustain_window() {
    let h = Harness::new(300_000);
    h.add_rule(power_rule("r-power", 10_000));

    h.feed(&Sample::new("LAMP_023", Metric::Power, 320.0, 1_000));
    h.feed(&Sample::new("LAMP_023", Metric::Power, 320.0, 5_000));

    let mut updated = power_rule("r-power", 10_000);
    updated.threshold = 300.0;
    h.rules.update(updated, 6_000).unwrap();

    // Would have satisfied the original window, but the update reset it.
    let events = h.feed(&Sample::new("LAMP_023", Metric::Power, 320.0, 12_000));
    assert!(events.is_empty());

    let events = h.feed(&Sample::new("LAMP_023", Metric::Power, 320.0, 22_500));
    assert_eq!(events.len(), 1);
}

#[test]
fn prediction_table_replacement_is_atomic_per_entry() {
    let h = Harness::new(300_000);
    // Drifting upward fast enough to produce a scored component.
    for i in 0..40i64 {
        h.feed(&Sample::new(
            "LAMP_001",
            Metric::Power,
            120.0 + 4.0 * i as f64,
            i * 3_600_000,
        ));
    }

    let first = h.scorer.run_cycle(40 * 3_600_000, || false);
    assert!(!first.is_empty());
    let before = h.scorer.table().list(Some("LAMP_001"));

    let second = h.scorer.run_cycle(41 * 3_600_000, || false);
    assert_eq!(second.len(), first.len());
    let after = h.scorer.table().list(Some("LAMP_001"));

    // Same (device, component) slots, refreshed in place.
    assert_eq!(before.len(), after.len());
    assert!(h.scorer.table().count() == after.len());
}

struct CapturingSender {
    channel: Channel,
    triggered: AtomicU32,
    cleared: AtomicU32,
}

impl CapturingSender {
    fn new(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            triggered: AtomicU32::new(0),
            cleared: AtomicU32::new(0),
        })
    }
}

#[async_trait::async_trait]
impl ChannelSender for CapturingSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        match notice.kind {
            NoticeKind::Triggered => self.triggered.fetch_add(1, Ordering::SeqCst),
            NoticeKind::Cleared => self.cleared.fetch_add(1, Ordering::SeqCst),
            NoticeKind::Predicted => 0,
        };
        Ok(())
    }
}

fn fast_config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.lifecycle.resolve_cooldown_ms = 0;
    cfg.notifier.base_delay_ms = 1;
    cfg
}

#[tokio::test]
async fn runtime_delivers_trigger_notification() {
    let sender = CapturingSender::new(Channel::Email);
    let engine = Engine::start(
        fast_config(),
        vec![Arc::clone(&sender) as Arc<dyn ChannelSender>],
        Persistence::default(),
    );
    engine.rules.add(power_rule("r-power", 0)).unwrap();

    let now = lumiwatch_common::time::now_ms();
    engine
        .ingress
        .ingest(Reading::new("LAMP_023", Metric::Power, 320.0, now))
        .unwrap();

    // The evaluator worker and dispatcher run on their own tasks.
    for _ in 0..50 {
        if sender.triggered.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(sender.triggered.load(Ordering::SeqCst), 1);
    assert_eq!(engine.lifecycle.list().len(), 1);
    assert_eq!(engine.query.ingest_stats().readings_ingested, 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn runtime_shutdown_drains_pending_readings() {
    let sender = CapturingSender::new(Channel::Email);
    let engine = Engine::start(
        fast_config(),
        vec![Arc::clone(&sender) as Arc<dyn ChannelSender>],
        Persistence::default(),
    );
    engine.rules.add(power_rule("r-power", 0)).unwrap();

    let now = lumiwatch_common::time::now_ms();
    for i in 0..10 {
        engine
            .ingress
            .ingest(Reading::new("LAMP_023", Metric::Power, 320.0, now + i))
            .unwrap();
    }

    engine.shutdown().await;
    // All queued samples were evaluated before the worker stopped; the
    // single episode produced one delivery job.
    for _ in 0..50 {
        if sender.triggered.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(sender.triggered.load(Ordering::SeqCst), 1);
}
