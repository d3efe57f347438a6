use std::sync::Arc;
use std::time::Duration;

use lumiwatch_common::retry::BackoffPolicy;
use lumiwatch_common::time::now_ms;

use super::channel::{ChannelSender, Notice};
use super::dlq::DlqWriter;
use super::job::{JobLog, NotificationJob};
use crate::metrics::EngineMetrics;
use crate::rules::Channel;

/// Fans a notice out to the configured channels, one job per (anomaly,
/// channel), with capped exponential backoff and a per-job timeout.
/// Delivery is at-least-once; exhausted jobs are recorded, never silently
/// dropped.
pub struct Dispatcher {
    senders: Vec<Arc<dyn ChannelSender>>,
    policy: BackoffPolicy,
    job_timeout: Duration,
    jobs: JobLog,
    dlq: Option<Arc<DlqWriter>>,
    metrics: Arc<EngineMetrics>,
}

impl Dispatcher {
    pub fn new(
        senders: Vec<Arc<dyn ChannelSender>>,
        policy: BackoffPolicy,
        job_timeout: Duration,
        jobs: JobLog,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            senders,
            policy,
            job_timeout,
            jobs,
            dlq: None,
            metrics,
        }
    }

    pub fn with_dlq(mut self, dlq: Arc<DlqWriter>) -> Self {
        self.dlq = Some(dlq);
        self
    }

    /// Spawn one delivery task per target channel that has a sender.
    /// Channels without a configured sender are skipped.
    pub fn dispatch(self: &Arc<Self>, notice: Notice, channels: &[Channel]) -> Vec<NotificationJob> {
        let mut opened = Vec::new();
        for channel in channels {
            let Some(sender) = self
                .senders
                .iter()
                .find(|s| s.channel() == *channel)
                .cloned()
            else {
                tracing::debug!(channel = channel.as_str(), "no sender configured, skipping");
                continue;
            };

            let job = self.jobs.open(&notice.anomaly_id, *channel, now_ms());
            opened.push(job.clone());

            let dispatcher = Arc::clone(self);
            let notice = notice.clone();
            tokio::spawn(async move {
                dispatcher.run_job(&job, sender, &notice).await;
            });
        }
        opened
    }

    /// Drive one job to a terminal state. Public so tests can run jobs
    /// without the spawn indirection.
    pub async fn run_job(
        &self,
        job: &NotificationJob,
        sender: Arc<dyn ChannelSender>,
        notice: &Notice,
    ) {
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counting = attempts.clone();

        let delivery = lumiwatch_common::retry::retry_async(&self.policy, || {
            counting.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            sender.send(notice)
        });

        let outcome = tokio::time::timeout(self.job_timeout, delivery).await;
        let attempt = attempts.load(std::sync::atomic::Ordering::SeqCst);

        match outcome {
            Ok(Ok(())) => {
                self.jobs.mark_sent(&job.id, attempt, now_ms());
                self.metrics.inc_notifications_sent();
            }
            Ok(Err(e)) => {
                self.fail_job(job, notice, attempt, &e.to_string()).await;
            }
            Err(_) => {
                self.fail_job(job, notice, attempt, "job timeout exceeded")
                    .await;
            }
        }
    }

    async fn fail_job(&self, job: &NotificationJob, notice: &Notice, attempt: u32, error: &str) {
        tracing::warn!(
            job_id = %job.id,
            anomaly_id = %notice.anomaly_id,
            channel = job.channel.as_str(),
            attempt,
            error,
            "notification delivery failed"
        );
        self.jobs.mark_failed(&job.id, attempt, error, now_ms());
        self.metrics.inc_notifications_failed();

        if let Some(ref dlq) = self.dlq {
            let payload = serde_json::to_value(notice).unwrap_or_default();
            if let Err(dlq_err) = dlq
                .insert(&notice.anomaly_id, job.channel.as_str(), &payload, error, attempt)
                .await
            {
                tracing::error!(error = %dlq_err, "failed to write notification DLQ");
            }
        }
    }

    pub fn jobs(&self) -> &JobLog {
        &self.jobs
    }
}
