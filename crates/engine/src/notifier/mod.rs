//! Notification fan-out: a notice per lifecycle transition, one delivery
//! job per configured channel, retried with backoff and dead-lettered on
//! exhaustion.

mod channel;
mod dispatcher;
mod dlq;
mod job;
mod webhook;

pub use channel::{ChannelSender, Notice, NoticeKind, NotifyError};
pub use dispatcher::Dispatcher;
pub use dlq::{DlqEntry, DlqWriter};
pub use job::{JobLog, JobStatus, NotificationJob};
pub use webhook::WebhookSender;
