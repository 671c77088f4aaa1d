// src/ingest/http.rs
use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_ATTEMPTS: u8 = 3;

pub fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("market-events-bot/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building http client")
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// GET `url` and decode the JSON body. Transport errors, 429 and 5xx are
/// retried with exponential backoff; other statuses fail immediately.
pub async fn get_json(client: &Client, url: &str, query: &[(&str, String)]) -> Result<Value> {
    let mut attempt: u8 = 0;
    loop {
        attempt += 1;
        let res = client.get(url).query(query).send().await;

        let err = match res {
            Ok(rsp) => {
                let status = rsp.status();
                if status.is_success() {
                    return rsp
                        .json::<Value>()
                        .await
                        .with_context(|| format!("decoding JSON from {url}"));
                }
                if !is_retryable(status) {
                    return Err(anyhow!("GET {url} returned HTTP {status}"));
                }
                anyhow!("GET {url} returned HTTP {status}")
            }
            Err(e) => anyhow!(e).context(format!("GET {url} failed")),
        };

        if attempt >= MAX_ATTEMPTS {
            return Err(err);
        }
        tracing::debug!(error = %err, attempt, "retrying market API request");
        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
    }
}
