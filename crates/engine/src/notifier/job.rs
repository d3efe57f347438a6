use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::rules::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Sent,
    Failed,
}

/// One delivery attempt series for (anomaly, channel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub id: String,
    pub anomaly_id: String,
    pub channel: Channel,
    pub attempt: u32,
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub updated_at_ms: i64,
}

const DEFAULT_JOB_CAPACITY: usize = 10_000;

/// In-memory job table, bounded so long-running engines do not keep
/// every delivery ever. Terminal failures stay visible to operators
/// through the query surface and outlive sent jobs under pressure.
#[derive(Clone)]
pub struct JobLog {
    jobs: Arc<DashMap<String, NotificationJob>>,
    capacity: usize,
}

impl Default for JobLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_JOB_CAPACITY)
    }
}

impl JobLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            capacity,
        }
    }

    pub fn open(&self, anomaly_id: &str, channel: Channel, now_ms: i64) -> NotificationJob {
        let job = NotificationJob {
            id: lumiwatch_common::id::new_id(),
            anomaly_id: anomaly_id.to_string(),
            channel,
            attempt: 0,
            status: JobStatus::Pending,
            last_error: None,
            updated_at_ms: now_ms,
        };
        self.jobs.insert(job.id.clone(), job.clone());
        self.evict_over_capacity();
        job
    }

    /// Drops terminal jobs once the table exceeds its capacity, sent
    /// before failed, oldest first. In-flight jobs are never dropped.
    fn evict_over_capacity(&self) {
        let over = self.jobs.len().saturating_sub(self.capacity);
        if over == 0 {
            return;
        }
        let mut terminal: Vec<(String, JobStatus, i64)> = self
            .jobs
            .iter()
            .filter(|j| j.status != JobStatus::Pending)
            .map(|j| (j.id.clone(), j.status, j.updated_at_ms))
            .collect();
        terminal.sort_by_key(|(_, status, at_ms)| (*status == JobStatus::Failed, *at_ms));
        for (id, _, _) in terminal.into_iter().take(over) {
            self.jobs.remove(&id);
        }
    }

    pub fn mark_sent(&self, job_id: &str, attempt: u32, now_ms: i64) {
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            job.attempt = attempt;
            job.status = JobStatus::Sent;
            job.updated_at_ms = now_ms;
        }
    }

    pub fn mark_failed(&self, job_id: &str, attempt: u32, error: &str, now_ms: i64) {
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            job.attempt = attempt;
            job.status = JobStatus::Failed;
            job.last_error = Some(error.to_string());
            job.updated_at_ms = now_ms;
        }
    }

    pub fn get(&self, job_id: &str) -> Option<NotificationJob> {
        self.jobs.get(job_id).map(|j| j.clone())
    }

    pub fn failed(&self) -> Vec<NotificationJob> {
        let mut out: Vec<NotificationJob> = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Failed)
            .map(|j| j.value().clone())
            .collect();
        out.sort_by_key(|j| std::cmp::Reverse(j.updated_at_ms));
        out
    }

    pub fn count(&self) -> usize {
        self.jobs.len()
    }
}
