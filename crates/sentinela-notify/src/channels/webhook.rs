use crate::{NotificationChannel, NotificationContent};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Generic webhook back-end: posts the alert lifecycle as JSON to the
/// URL given in the notification spec params (`{"url": "..."}`).
pub struct WebhookChannel {
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    fn url(content: &NotificationContent) -> Result<String> {
        content
            .params
            .get("url")
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("webhook notification requires params.url"))
    }

    async fn post(&self, content: &NotificationContent, action: &str) -> Result<()> {
        let url = Self::url(content)?;
        let body = json!({
            "action": action,
            "monitor": content.monitor_name,
            "alert_id": content.alert_id,
            "priority": content.priority,
            "event_name": content.event_name,
            "alert": content.alert_data,
            "mentions": content.mentions,
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned {status}: {detail}");
        }
        Ok(())
    }
}

impl Default for WebhookChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn channel_type(&self) -> &str {
        "webhook"
    }

    async fn open(&self, content: &NotificationContent) -> Result<String> {
        self.post(content, "open").await?;
        // Webhooks have no server-side message identity; the target
        // only needs to be stable per alert.
        Ok(format!("webhook:{}", content.alert_id))
    }

    async fn update(&self, _target: &str, content: &NotificationContent) -> Result<()> {
        self.post(content, "update").await
    }

    async fn close(&self, _target: &str, content: &NotificationContent) -> Result<()> {
        self.post(content, "close").await
    }
}
