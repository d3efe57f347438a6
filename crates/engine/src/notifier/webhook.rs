use reqwest::Client;

use super::channel::{ChannelSender, Notice, NotifyError};
use crate::rules::Channel;

/// Channel transport that POSTs the notice to an HTTP endpoint. The
/// hosting application points each channel (email/sms/push gateway) at
/// its own URL.
pub struct WebhookSender {
    channel: Channel,
    url: String,
    client: Client,
}

impl WebhookSender {
    pub fn new(channel: Channel, url: String) -> Self {
        Self {
            channel,
            url,
            client: Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl ChannelSender for WebhookSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        self.client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Lumiwatch-Channel", self.channel.as_str())
            .json(notice)
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?
            .error_for_status()
            .map_err(|e| NotifyError(e.to_string()))?;

        Ok(())
    }
}
