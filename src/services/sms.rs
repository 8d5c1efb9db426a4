// Semaphore SMS gateway client.
//
// Delivery is best effort: outcomes are logged and forwarded, never allowed
// to fail the core mutation that triggered the message.
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config;

const SEMAPHORE_ENDPOINT: &str = "https://api.semaphore.co/api/v4/messages";

pub struct SmsClient {
    http: reqwest::Client,
}

impl SmsClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    /// Send one message and return the gateway's response payload.
    pub async fn send(&self, to: &str, message: &str) -> anyhow::Result<Value> {
        let cfg = &config::config().sms;
        if !cfg.enabled {
            info!(to, "sms gateway disabled; message not sent");
            return Ok(json!({ "skipped": true }));
        }

        let response = self
            .http
            .post(SEMAPHORE_ENDPOINT)
            .json(&json!({
                "apikey": cfg.api_key,
                "number": to,
                "message": message,
                "sendername": cfg.sender_name,
            }))
            .send()
            .await?;

        let body: Value = response.json().await?;
        Ok(body)
    }
}

impl Default for SmsClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Fire-and-forget delivery. Spawned off the request path so gateway latency
/// or failure cannot roll back the transaction that already committed.
pub fn notify(to: String, message: String) {
    tokio::spawn(async move {
        let client = SmsClient::new();
        match client.send(&to, &message).await {
            Ok(body) => info!(to, ?body, "sms dispatched"),
            Err(e) => warn!(to, error = %e, "sms delivery failed"),
        }
    });
}
