// src/notify/dispatcher.rs
//! Turns a batch of new events into webhook posts, one per category group,
//! spaced by the post cooldown and retried once when throttled.

use anyhow::{anyhow, Result};
use metrics::counter;
use std::time::Duration;
use tokio::time::Instant;

use super::cooldown::PostCooldown;
use super::embed::{group_by_category, render_group, startup_embed, Embed, StartupInfo};
use super::{Delivery, NotifyChannel, WebhookIdentity};
use crate::model::MarketEvent;

/// Throttle responses honoured per payload before it is dropped.
const MAX_THROTTLE_RETRIES: u8 = 1;

pub struct Dispatcher {
    channel: Box<dyn NotifyChannel>,
    identity: WebhookIdentity,
    cooldown: PostCooldown,
    startup_sent: bool,
}

impl Dispatcher {
    pub fn new(channel: Box<dyn NotifyChannel>, identity: WebhookIdentity) -> Self {
        Self {
            channel,
            identity,
            cooldown: PostCooldown::default(),
            startup_sent: false,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = PostCooldown::new(cooldown);
        self
    }

    /// Post `events` grouped by category. Returns the events whose group was
    /// delivered, in input order; failed groups are logged and skipped.
    pub async fn post_grouped(&mut self, events: &[MarketEvent]) -> Vec<MarketEvent> {
        let groups = group_by_category(events);
        let mut delivered = vec![false; events.len()];

        for group in &groups {
            let embed = render_group(group);
            match self.deliver(embed).await {
                Ok(()) => {
                    tracing::info!(
                        category = %group.category,
                        count = group.events.len(),
                        "posted group"
                    );
                    for &i in &group.indices {
                        delivered[i] = true;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        error = ?e,
                        category = %group.category,
                        count = group.events.len(),
                        "dropping group after failed delivery"
                    );
                    counter!("webhook_failures_total").increment(1);
                }
            }
        }

        events
            .iter()
            .zip(delivered)
            .filter_map(|(ev, ok)| ok.then(|| ev.clone()))
            .collect()
    }

    /// Send the status message. Only the first call per dispatcher posts.
    pub async fn post_startup(&mut self, info: &StartupInfo) -> Result<()> {
        if self.startup_sent {
            return Ok(());
        }
        self.startup_sent = true;
        self.deliver(startup_embed(info)).await?;
        tracing::info!("posted startup message");
        Ok(())
    }

    async fn deliver(&mut self, embed: Embed) -> Result<()> {
        let payload = self.identity.payload(vec![embed]);

        let mut attempt: u8 = 0;
        loop {
            self.cooldown.wait().await;
            let res = self.channel.post(&payload).await;
            self.cooldown.record_post(Instant::now());

            match res? {
                Delivery::Delivered => {
                    counter!("webhook_posts_total").increment(1);
                    return Ok(());
                }
                Delivery::Throttled(wait) => {
                    counter!("webhook_throttled_total").increment(1);
                    if attempt >= MAX_THROTTLE_RETRIES {
                        return Err(anyhow!("still throttled after {attempt} retry"));
                    }
                    attempt += 1;
                    tracing::warn!(retry_after_ms = wait.as_millis() as u64, "webhook throttled");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}
