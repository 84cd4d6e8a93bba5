use crate::{Envelope, Message, MessageKind, QueueError, WorkQueue};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Adapter for an external SQS-shaped broker speaking the JSON wire
/// protocol (`X-Amz-Target: AmazonSQS.<Action>`). Works against
/// self-hosted SQS-compatible brokers; authentication, when the broker
/// requires one, is supplied through static headers.
pub struct BrokerQueue {
    http: reqwest::Client,
    endpoint: String,
    queue_url: String,
    headers: HashMap<String, String>,
    visibility: Duration,
}

#[derive(Debug, Deserialize)]
struct ReceiveResponse {
    #[serde(rename = "Messages", default)]
    messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Deserialize)]
struct ReceivedMessage {
    #[serde(rename = "Body")]
    body: String,
    #[serde(rename = "ReceiptHandle")]
    receipt_handle: String,
}

impl BrokerQueue {
    pub fn new(
        endpoint: String,
        queue_url: String,
        headers: HashMap<String, String>,
        visibility: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            queue_url,
            headers,
            visibility,
        }
    }

    async fn call(
        &self,
        action: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, QueueError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header("X-Amz-Target", format!("AmazonSQS.{action}"))
            .header("Content-Type", "application/x-amz-json-1.0")
            .json(&body);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(QueueError::Transport(format!(
                "{action} returned {status}: {detail}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl WorkQueue for BrokerQueue {
    async fn send(&self, kind: MessageKind, payload: serde_json::Value) -> Result<(), QueueError> {
        let envelope = Envelope { kind, payload };
        self.call(
            "SendMessage",
            serde_json::json!({
                "QueueUrl": self.queue_url,
                "MessageBody": serde_json::to_string(&envelope)?,
            }),
        )
        .await?;
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Message>, QueueError> {
        let response = self
            .call(
                "ReceiveMessage",
                serde_json::json!({
                    "QueueUrl": self.queue_url,
                    "MaxNumberOfMessages": 1,
                    "WaitTimeSeconds": wait.as_secs(),
                    "VisibilityTimeout": self.visibility.as_secs(),
                }),
            )
            .await?;
        if response.is_null() {
            return Ok(None);
        }

        let parsed: ReceiveResponse = serde_json::from_value(response)?;
        let Some(received) = parsed.messages.into_iter().next() else {
            return Ok(None);
        };

        let envelope: Envelope = serde_json::from_str(&received.body)?;
        Ok(Some(Message {
            kind: envelope.kind,
            payload: envelope.payload,
            receipt: received.receipt_handle,
        }))
    }

    async fn extend_visibility(
        &self,
        message: &Message,
        window: Duration,
    ) -> Result<(), QueueError> {
        self.call(
            "ChangeMessageVisibility",
            serde_json::json!({
                "QueueUrl": self.queue_url,
                "ReceiptHandle": message.receipt,
                "VisibilityTimeout": window.as_secs(),
            }),
        )
        .await?;
        Ok(())
    }

    async fn ack(&self, message: &Message) -> Result<(), QueueError> {
        self.call(
            "DeleteMessage",
            serde_json::json!({
                "QueueUrl": self.queue_url,
                "ReceiptHandle": message.receipt,
            }),
        )
        .await?;
        Ok(())
    }

    async fn nack(&self, message: &Message) -> Result<(), QueueError> {
        self.call(
            "ChangeMessageVisibility",
            serde_json::json!({
                "QueueUrl": self.queue_url,
                "ReceiptHandle": message.receipt,
                "VisibilityTimeout": 0,
            }),
        )
        .await?;
        Ok(())
    }
}
