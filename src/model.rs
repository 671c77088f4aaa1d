// src/model.rs
//! Unified, source-tagged market event shared by fetchers, the seen store and
//! the dispatcher.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Embed colour used when a group mixes sources or for status messages.
pub const NEUTRAL_COLOR: u32 = 0x5865F2;

pub const UNKNOWN_CATEGORY: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSource {
    Polymarket,
    Kalshi,
}

impl MarketSource {
    pub const ALL: [MarketSource; 2] = [MarketSource::Polymarket, MarketSource::Kalshi];

    /// Tag persisted in the `source` column.
    pub fn as_str(self) -> &'static str {
        match self {
            MarketSource::Polymarket => "polymarket",
            MarketSource::Kalshi => "kalshi",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            MarketSource::Polymarket => "Polymarket",
            MarketSource::Kalshi => "Kalshi",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            MarketSource::Polymarket => "🟣",
            MarketSource::Kalshi => "🟢",
        }
    }

    pub fn color(self) -> u32 {
        match self {
            MarketSource::Polymarket => 0x7C3AED,
            MarketSource::Kalshi => 0x10B981,
        }
    }
}

impl fmt::Display for MarketSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polymarket" => Ok(MarketSource::Polymarket),
            "kalshi" => Ok(MarketSource::Kalshi),
            other => Err(anyhow!("unknown market source: {other:?}")),
        }
    }
}

/// A market listed by one source. Identity is the `(id, source)` pair; the
/// remaining fields are display data only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEvent {
    pub id: String,
    pub source: MarketSource,
    pub title: String,
    pub description: String,
    pub url: String,
    pub category: String,
    pub created_at: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl MarketEvent {
    pub fn new(id: impl Into<String>, source: MarketSource, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source,
            title: title.into(),
            description: String::new(),
            url: String::new(),
            category: UNKNOWN_CATEGORY.to_string(),
            created_at: None,
            end_date: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn key(&self) -> (&str, MarketSource) {
        (self.id.as_str(), self.source)
    }

    /// Grouping key; blank categories fall back to "Unknown".
    pub fn category_or_unknown(&self) -> &str {
        let c = self.category.trim();
        if c.is_empty() {
            UNKNOWN_CATEGORY
        } else {
            c
        }
    }
}

impl PartialEq for MarketEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for MarketEvent {}

impl Hash for MarketEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}
