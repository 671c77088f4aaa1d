// src/ingest/types.rs
use anyhow::Result;

use crate::model::{MarketEvent, MarketSource};

/// A market API that lists current events, already normalized and filtered
/// by time-to-expiration.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_events(&self) -> Result<Vec<MarketEvent>>;
    fn source(&self) -> MarketSource;
}
