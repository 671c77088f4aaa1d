//! In-memory `NotifyChannel` for tests. Only built under `cfg(test)` or the
//! `test-util` feature; never linked into the production binary.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{Delivery, NotifyChannel, WebhookPayload};

/// Scripted reply for `MockChannel`.
#[derive(Debug, Clone)]
pub enum MockReply {
    Ok,
    Throttle(Duration),
    Fail(String),
}

/// Records every payload it receives and answers from a script; once the
/// script is exhausted every post succeeds. Clones share state.
#[derive(Clone, Default)]
pub struct MockChannel {
    posts: Arc<Mutex<Vec<WebhookPayload>>>,
    script: Arc<Mutex<VecDeque<MockReply>>>,
}

// A panicking test thread must not hide what was recorded before it.
fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(replies: impl IntoIterator<Item = MockReply>) -> Self {
        let mock = Self::default();
        relock(&mock.script).extend(replies);
        mock
    }

    pub fn posted(&self) -> Vec<WebhookPayload> {
        relock(&self.posts).clone()
    }
}

#[async_trait::async_trait]
impl NotifyChannel for MockChannel {
    async fn post(&self, payload: &WebhookPayload) -> Result<Delivery> {
        relock(&self.posts).push(payload.clone());
        let reply = relock(&self.script).pop_front();
        match reply.unwrap_or(MockReply::Ok) {
            MockReply::Ok => Ok(Delivery::Delivered),
            MockReply::Throttle(d) => Ok(Delivery::Throttled(d)),
            MockReply::Fail(msg) => Err(anyhow!(msg)),
        }
    }
}
