use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::scrapers::traits::Notifier;

/// Delivers notifications by POSTing them to the real-time gateway.
/// Any 2xx response counts as delivered.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn emit(&self, user_id: i64, payload: &Value) -> Result<bool> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({"userId": user_id, "payload": payload}))
            .send()
            .await
            .context("Failed to reach notification gateway")?;

        let status = response.status();
        debug!(user_id, status = status.as_u16(), "Notification emitted");
        Ok(status.is_success())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn success_status_means_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"userId": 7})))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri()).unwrap();
        assert!(notifier.emit(7, &json!({"postId": 1})).await.unwrap());
    }

    #[tokio::test]
    async fn offline_user_is_not_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri()).unwrap();
        assert!(!notifier.emit(7, &json!({"postId": 1})).await.unwrap());
    }
}
