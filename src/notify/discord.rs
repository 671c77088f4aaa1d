use super::{Delivery, NotifyChannel, WebhookPayload};
use anyhow::{anyhow, Context, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);
const MAX_RETRY_AFTER_SECS: f64 = 300.0;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct DiscordWebhook {
    webhook: String,
    client: Client,
}

impl DiscordWebhook {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl NotifyChannel for DiscordWebhook {
    async fn post(&self, payload: &WebhookPayload) -> Result<Delivery> {
        let rsp = self
            .client
            .post(&self.webhook)
            .timeout(REQUEST_TIMEOUT)
            .json(payload)
            .send()
            .await
            .context("Discord webhook request failed")?;

        if rsp.status() == StatusCode::TOO_MANY_REQUESTS {
            let header = rsp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = rsp.text().await.unwrap_or_default();
            return Ok(Delivery::Throttled(retry_after(&body, header.as_deref())));
        }

        if let Err(e) = rsp.error_for_status_ref() {
            return Err(anyhow!("Discord webhook HTTP error: {e}"));
        }
        Ok(Delivery::Delivered)
    }
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

/// Wait time from a 429: JSON `retry_after` (seconds, fractional) first,
/// then the `Retry-After` header, then a fixed default.
pub fn retry_after(body: &str, header: Option<&str>) -> Duration {
    let secs = serde_json::from_str::<RateLimitBody>(body)
        .ok()
        .map(|b| b.retry_after)
        .or_else(|| header.and_then(|h| h.trim().parse::<f64>().ok()))
        .filter(|s| s.is_finite() && *s >= 0.0);

    match secs {
        Some(s) => Duration::from_secs_f64(s.min(MAX_RETRY_AFTER_SECS)),
        None => DEFAULT_RETRY_AFTER,
    }
}
