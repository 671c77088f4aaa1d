// src/lib.rs
// Public library surface for the binary, the demo tool and integration tests.

pub mod bot;
pub mod config;
pub mod ingest;
pub mod model;
pub mod notify;
pub mod storage;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::bot::{BotSettings, CycleReport, MarketEventsBot};
pub use crate::config::BotConfig;
pub use crate::model::{MarketEvent, MarketSource};
pub use crate::notify::{Dispatcher, NotifyChannel, WebhookIdentity};
pub use crate::storage::{SeenStore, StoreStats};
