//! Webhook delivery over HTTP.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{DeliveryError, Dispatcher, Receipt};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Delivers payloads by POSTing JSON to the target URL.
///
/// The body is `{"content": <payload>}`, the shape Discord-compatible
/// webhooks accept. When the response carries a JSON `id` field it is
/// returned as the receipt's message id.
pub struct WebhookDispatcher {
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct WebhookResponse {
    id: Option<String>,
}

impl WebhookDispatcher {
    /// Create a dispatcher with a default HTTP client.
    pub fn new() -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .map_err(|e| DeliveryError::new(format!("http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Dispatcher for WebhookDispatcher {
    async fn deliver(&self, target: &str, payload: &str) -> Result<Receipt, DeliveryError> {
        let response = self
            .client
            .post(target)
            .query(&[("wait", "true")])
            .json(&json!({ "content": payload }))
            .send()
            .await
            .map_err(|e| DeliveryError::new(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::new(format!(
                "target returned {}",
                status.as_u16()
            )));
        }

        // Best effort: not every webhook returns a message body.
        let id = response
            .json::<WebhookResponse>()
            .await
            .ok()
            .and_then(|body| body.id);

        debug!(target = %target, receipt_id = ?id, "payload delivered");
        Ok(Receipt { id })
    }
}
