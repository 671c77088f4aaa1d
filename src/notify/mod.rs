pub mod cooldown;
pub mod discord;
pub mod dispatcher;
pub mod embed;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use anyhow::Result;
use std::time::Duration;

pub use dispatcher::Dispatcher;
pub use embed::{Embed, StartupInfo, WebhookPayload};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockChannel, MockReply};

/// How the channel answered a post that reached it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The channel asked us to wait this long before trying again.
    Throttled(Duration),
}

/// Outbound notification channel. Transport failures and non-throttle error
/// statuses come back as `Err`.
#[async_trait::async_trait]
pub trait NotifyChannel: Send + Sync {
    async fn post(&self, payload: &WebhookPayload) -> Result<Delivery>;
}

/// Name and avatar the webhook posts under.
#[derive(Debug, Clone)]
pub struct WebhookIdentity {
    pub username: String,
    pub avatar_url: Option<String>,
}

impl WebhookIdentity {
    pub fn payload(&self, embeds: Vec<Embed>) -> WebhookPayload {
        WebhookPayload {
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
            embeds,
        }
    }
}
