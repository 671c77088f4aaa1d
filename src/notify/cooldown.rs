// src/notify/cooldown.rs
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_POST_COOLDOWN: Duration = Duration::from_secs(2);

/// Minimum spacing between outbound posts.
/// - First post goes out immediately.
/// - Spacing is measured from the completion of the previous post.
/// - State is updated explicitly via `record_post` once a post returns.
#[derive(Debug, Clone)]
pub struct PostCooldown {
    cooldown: Duration,
    last_post: Option<Instant>,
}

impl Default for PostCooldown {
    fn default() -> Self {
        Self::new(DEFAULT_POST_COOLDOWN)
    }
}

impl PostCooldown {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_post: None,
        }
    }

    /// Time still to wait at `now`. Does NOT mutate state.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_post {
            None => Duration::ZERO,
            Some(ts) => self.cooldown.saturating_sub(now.saturating_duration_since(ts)),
        }
    }

    /// Sleep out whatever is left of the cooldown.
    pub async fn wait(&self) {
        let left = self.remaining(Instant::now());
        if !left.is_zero() {
            tracing::trace!(wait_ms = left.as_millis() as u64, "post cooldown");
            tokio::time::sleep(left).await;
        }
    }

    pub fn record_post(&mut self, at: Instant) {
        self.last_post = Some(at);
    }
}
