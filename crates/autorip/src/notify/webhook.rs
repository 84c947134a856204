//! HTTP webhook channel: POSTs each event as JSON.

use super::{JobEvent, NotificationChannel, NotifyError};
use async_trait::async_trait;
use autorip_config::WebhookConfig;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: String,
    #[serde(flatten)]
    event: &'a JobEvent,
}

#[derive(Debug, Clone)]
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(config: &WebhookConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, event: &JobEvent) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            text: event.summary(),
            event,
        };
        let response = self.client.post(&self.url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!("{status} - {body}")));
        }
        debug!(url = %self.url, job_id = event.job_id, "webhook delivered");
        Ok(())
    }
}
