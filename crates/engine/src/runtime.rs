//! Wires the pipeline together: ingress fan-out, the evaluator worker,
//! the lifecycle ticker, the predictive scorer, and notification
//! dispatch run as independent tasks sharing state through the stores.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use lumiwatch_common::retry::BackoffPolicy;
use lumiwatch_common::time::now_ms;

use crate::config::EngineConfig;
use crate::evaluator::{Evaluator, RuleEvent};
use crate::ingress::{self, HistoryStore, Ingress, QueueReceiver};
use crate::lifecycle::{
    Anomaly, AnomalySource, AnomalyStore, LifecycleManager, LifecycleUpdate,
};
use crate::metrics::EngineMetrics;
use crate::notifier::{ChannelSender, Dispatcher, DlqWriter, JobLog, Notice};
use crate::predictor::{Prediction, PredictionStore, PredictionTable, PredictiveScorer};
use crate::query::QueryService;
use crate::reading::Reading;
use crate::rules::{Channel, RuleStore, Severity};

/// Optional write-behind stores. The engine stays fully functional in
/// memory when no database is attached.
#[derive(Clone, Default)]
pub struct Persistence {
    pub anomalies: Option<Arc<AnomalyStore>>,
    pub predictions: Option<Arc<PredictionStore>>,
    pub dlq: Option<Arc<DlqWriter>>,
}

impl Persistence {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            anomalies: Some(Arc::new(AnomalyStore::new(pool.clone()))),
            predictions: Some(Arc::new(PredictionStore::new(pool.clone()))),
            dlq: Some(Arc::new(DlqWriter::new(pool))),
        }
    }

    async fn save_anomaly(&self, anomaly: &Anomaly) {
        if let Some(ref store) = self.anomalies {
            if let Err(e) = store.upsert(anomaly).await {
                tracing::error!(error = %e, anomaly_id = %anomaly.id, "anomaly upsert failed");
            }
        }
    }

    async fn save_prediction(&self, prediction: &Prediction) {
        if let Some(ref store) = self.predictions {
            if let Err(e) = store.upsert(prediction).await {
                tracing::error!(
                    error = %e,
                    device_id = %prediction.device_id,
                    "prediction upsert failed"
                );
            }
        }
    }
}

/// A running engine. Dropping it does not stop the tasks; call
/// [`Engine::shutdown`] for an orderly stop that drains the queues.
pub struct Engine {
    pub ingress: Arc<Ingress>,
    pub history: Arc<HistoryStore>,
    pub rules: Arc<RuleStore>,
    pub lifecycle: Arc<LifecycleManager>,
    pub predictions: PredictionTable,
    pub query: Arc<QueryService>,
    pub metrics: Arc<EngineMetrics>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    pub fn start(
        cfg: EngineConfig,
        senders: Vec<Arc<dyn ChannelSender>>,
        persistence: Persistence,
    ) -> Self {
        let metrics = EngineMetrics::new();
        let history = Arc::new(HistoryStore::new(cfg.ingress.history_capacity));
        let rules = Arc::new(RuleStore::new());
        let lifecycle = Arc::new(LifecycleManager::new(
            cfg.lifecycle.resolve_cooldown_ms,
            Arc::clone(&metrics),
        ));
        let predictions = PredictionTable::new();
        let jobs = JobLog::new();

        let (eval_tx, eval_rx) = ingress::channel(cfg.ingress.queue_capacity);
        let (scorer_tx, scorer_rx) = ingress::channel(cfg.ingress.queue_capacity);
        let ingress = Arc::new(Ingress::new(
            Arc::clone(&history),
            cfg.ingress.skew_tolerance_ms,
            eval_tx,
            scorer_tx,
            Arc::clone(&metrics),
        ));

        // Channels a notice falls back to when no rule supplies a routing
        // list, e.g. prediction-sourced anomalies.
        let default_channels: Vec<Channel> = senders.iter().map(|s| s.channel()).collect();
        let mut dispatcher = Dispatcher::new(
            senders,
            BackoffPolicy {
                max_attempts: cfg.notifier.max_attempts,
                base_delay: Duration::from_millis(cfg.notifier.base_delay_ms),
                max_delay: Duration::from_secs(30),
            },
            Duration::from_millis(cfg.notifier.job_timeout_ms),
            jobs.clone(),
            Arc::clone(&metrics),
        );
        if let Some(ref dlq) = persistence.dlq {
            dispatcher = dispatcher.with_dlq(Arc::clone(dlq));
        }
        let dispatcher = Arc::new(dispatcher);

        let query = Arc::new(QueryService::new(
            Arc::clone(&ingress),
            Arc::clone(&history),
            Arc::clone(&lifecycle),
            predictions.clone(),
            jobs,
            Arc::clone(&metrics),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(evaluator_worker(
            eval_rx,
            Evaluator::new(Arc::clone(&rules), cfg.evaluator.eq_epsilon, Arc::clone(&metrics)),
            Arc::clone(&lifecycle),
            Arc::clone(&dispatcher),
            persistence.clone(),
        )));

        tasks.push(tokio::spawn(lifecycle_ticker(
            Arc::clone(&lifecycle),
            Arc::clone(&rules),
            Arc::clone(&dispatcher),
            default_channels.clone(),
            persistence.clone(),
            shutdown_rx.clone(),
        )));

        tasks.push(tokio::spawn(scorer_worker(
            scorer_rx,
            PredictiveScorer::new(
                Arc::clone(&history),
                predictions.clone(),
                cfg.scorer.min_samples,
                Arc::clone(&metrics),
            ),
            Arc::clone(&lifecycle),
            Arc::clone(&dispatcher),
            default_channels,
            persistence,
            cfg.scorer.interval_ms,
            cfg.scorer.alert_probability,
            Arc::clone(&metrics),
            shutdown_rx,
        )));

        Self {
            ingress,
            history,
            rules,
            lifecycle,
            predictions,
            query,
            metrics,
            shutdown_tx,
            tasks,
        }
    }

    /// Stop accepting work, drain both queues, and wait for the workers.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.ingress.shutdown();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "engine task panicked");
            }
        }
    }
}

/// The resolve cooldown counts against wall-clock ticks, so a clear
/// carried on a backfilled reading must not predate its arrival.
fn clamp_clear_to_receipt(mut event: RuleEvent, received_at_ms: i64) -> RuleEvent {
    if !event.is_trigger() && event.at_ms < received_at_ms {
        event.at_ms = received_at_ms;
    }
    event
}

pub fn severity_for_probability(probability: f64) -> Severity {
    if probability >= 80.0 {
        Severity::High
    } else if probability >= 50.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Single consumer of the evaluator queue. One worker keeps samples in
/// arrival order, which the sustain windows depend on.
async fn evaluator_worker(
    rx: QueueReceiver<Reading>,
    evaluator: Evaluator,
    lifecycle: Arc<LifecycleManager>,
    dispatcher: Arc<Dispatcher>,
    persistence: Persistence,
) {
    let mut since_prune: u32 = 0;
    while let Some(reading) = rx.recv().await {
        since_prune += 1;
        if since_prune >= 1024 {
            since_prune = 0;
            let pruned = evaluator.prune_stale_episodes();
            if pruned > 0 {
                tracing::debug!(pruned, "dropped episodes for deleted rules");
            }
        }
        for event in evaluator.evaluate(&reading) {
            let event = clamp_clear_to_receipt(event, now_ms());
            let Some(update) = lifecycle.on_event(&event) else {
                continue;
            };
            match update {
                LifecycleUpdate::Opened(anomaly) => {
                    tracing::info!(
                        anomaly_id = %anomaly.id,
                        device_id = %anomaly.device_id,
                        rule_id = %event.rule_id,
                        severity = anomaly.severity.as_str(),
                        "anomaly opened"
                    );
                    persistence.save_anomaly(&anomaly).await;
                    dispatcher.dispatch(Notice::triggered(&anomaly), &event.channels);
                }
                LifecycleUpdate::Retriggered(anomaly)
                | LifecycleUpdate::CooldownStarted(anomaly) => {
                    persistence.save_anomaly(&anomaly).await;
                }
            }
        }
    }
    tracing::debug!("evaluator worker stopped");
}

/// Resolves anomalies whose clear outlasted the cooldown and notifies
/// the rule's channels of the resolution.
async fn lifecycle_ticker(
    lifecycle: Arc<LifecycleManager>,
    rules: Arc<RuleStore>,
    dispatcher: Arc<Dispatcher>,
    default_channels: Vec<Channel>,
    persistence: Persistence,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                for anomaly in lifecycle.tick(now_ms()) {
                    tracing::info!(
                        anomaly_id = %anomaly.id,
                        device_id = %anomaly.device_id,
                        "anomaly auto-resolved"
                    );
                    persistence.save_anomaly(&anomaly).await;
                    let channels = match anomaly.source {
                        AnomalySource::Rule(ref rule_id) => rules
                            .get(rule_id)
                            .map(|r| r.channels)
                            .unwrap_or_else(|| default_channels.clone()),
                        AnomalySource::Prediction(_) => default_channels.clone(),
                    };
                    dispatcher.dispatch(Notice::cleared(&anomaly), &channels);
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
    tracing::debug!("lifecycle ticker stopped");
}

/// Periodic scoring pass over devices with fresh samples. High scores
/// are promoted into the same anomaly table the rule evaluator feeds.
#[allow(clippy::too_many_arguments)]
async fn scorer_worker(
    rx: QueueReceiver<Reading>,
    scorer: PredictiveScorer,
    lifecycle: Arc<LifecycleManager>,
    dispatcher: Arc<Dispatcher>,
    default_channels: Vec<Channel>,
    persistence: Persistence,
    interval_ms: u64,
    alert_probability: f64,
    metrics: Arc<EngineMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Only devices that reported since the last pass are
                // rescored.
                let mut dirty = BTreeSet::new();
                while let Some(reading) = rx.try_recv() {
                    dirty.insert(reading.device_id);
                }
                if dirty.is_empty() {
                    continue;
                }
                let now = now_ms();
                for device_id in &dirty {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    for prediction in scorer.score_device(device_id, now) {
                        persistence.save_prediction(&prediction).await;
                        promote(
                            &prediction,
                            alert_probability,
                            &lifecycle,
                            &dispatcher,
                            &default_channels,
                            &persistence,
                        )
                        .await;
                    }
                }
                metrics.inc_scorer_cycles();
            }
            _ = shutdown_rx.changed() => break,
        }
    }
    tracing::debug!("scorer worker stopped");
}

async fn promote(
    prediction: &Prediction,
    alert_probability: f64,
    lifecycle: &LifecycleManager,
    dispatcher: &Arc<Dispatcher>,
    default_channels: &[Channel],
    persistence: &Persistence,
) {
    if prediction.failure_probability < alert_probability {
        return;
    }
    let severity = severity_for_probability(prediction.failure_probability);
    let update = lifecycle.on_trigger(
        AnomalySource::Prediction(prediction.component.as_str().to_string()),
        &prediction.device_id,
        prediction.component.primary_metric(),
        prediction.failure_probability,
        alert_probability,
        severity,
        prediction.generated_at_ms,
    );
    match update {
        LifecycleUpdate::Opened(anomaly) => {
            tracing::info!(
                anomaly_id = %anomaly.id,
                device_id = %anomaly.device_id,
                component = prediction.component.as_str(),
                probability = prediction.failure_probability,
                "predicted failure opened anomaly"
            );
            persistence.save_anomaly(&anomaly).await;
            dispatcher.dispatch(
                Notice::predicted(prediction, &anomaly.id, severity),
                default_channels,
            );
        }
        LifecycleUpdate::Retriggered(anomaly) | LifecycleUpdate::CooldownStarted(anomaly) => {
            persistence.save_anomaly(&anomaly).await;
        }
    }
}
