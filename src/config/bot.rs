// src/config/bot.rs
use anyhow::{anyhow, bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::ingest::providers::{kalshi, polymarket};
use crate::model::MarketSource;

pub const DEFAULT_DATABASE_PATH: &str = "data/seen_markets.db";
pub const DEFAULT_USERNAME: &str = "Market Events";
pub const DEFAULT_AVATAR_URL: &str = "https://i.imgur.com/AfFp7pu.png";

/// 100 years; keeps time arithmetic on these values far from chrono's range limits.
pub const MAX_RETENTION_DAYS: i64 = 36_500;
pub const MAX_HOURS_TO_EXPIRATION: i64 = 876_000;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_webhook_url: String,
    pub poll_interval_secs: u64,
    pub database_path: PathBuf,
    pub polymarket_api_url: String,
    pub kalshi_api_url: String,
    pub bot_username: String,
    /// `None` when `BOT_AVATAR_URL` is set to an empty string.
    pub bot_avatar_url: Option<String>,
    pub min_hours_to_expiration: i64,
    pub retention_days: i64,
    pub sources: Vec<MarketSource>,
    pub metrics_addr: Option<SocketAddr>,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (env, map in tests). Blank values count as unset
    /// except for `BOT_AVATAR_URL`, where blank disables the avatar.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let discord_webhook_url = get("DISCORD_WEBHOOK_URL")
            .ok_or_else(|| anyhow!("DISCORD_WEBHOOK_URL environment variable is required"))?;
        if !discord_webhook_url.starts_with("http://") && !discord_webhook_url.starts_with("https://") {
            bail!("DISCORD_WEBHOOK_URL must be an http(s) URL");
        }

        let poll_interval_secs: u64 = parse_or(&get, "POLL_INTERVAL_SECONDS", 300)?;
        if poll_interval_secs == 0 {
            bail!("POLL_INTERVAL_SECONDS must be greater than zero");
        }

        let min_hours_to_expiration: i64 = parse_or(&get, "MIN_HOURS_TO_EXPIRATION", 24)?;
        if !(0..=MAX_HOURS_TO_EXPIRATION).contains(&min_hours_to_expiration) {
            bail!("MIN_HOURS_TO_EXPIRATION must be between 0 and {MAX_HOURS_TO_EXPIRATION}");
        }

        let retention_days: i64 = parse_or(&get, "RETENTION_DAYS", 90)?;
        if !(1..=MAX_RETENTION_DAYS).contains(&retention_days) {
            bail!("RETENTION_DAYS must be between 1 and {MAX_RETENTION_DAYS}");
        }

        let sources = match get("ENABLED_SOURCES") {
            Some(list) => parse_sources(&list)?,
            None => MarketSource::ALL.to_vec(),
        };

        let metrics_addr = get("METRICS_ADDR")
            .map(|a| a.parse::<SocketAddr>().with_context(|| format!("invalid METRICS_ADDR {a:?}")))
            .transpose()?;

        let bot_avatar_url = match lookup("BOT_AVATAR_URL") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v.trim().to_string()),
            None => Some(DEFAULT_AVATAR_URL.to_string()),
        };

        Ok(Self {
            discord_webhook_url,
            poll_interval_secs,
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            polymarket_api_url: get("POLYMARKET_API_URL")
                .unwrap_or_else(|| polymarket::DEFAULT_API_URL.to_string()),
            kalshi_api_url: get("KALSHI_API_URL")
                .unwrap_or_else(|| kalshi::DEFAULT_API_URL.to_string()),
            bot_username: get("BOT_USERNAME").unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            bot_avatar_url,
            min_hours_to_expiration,
            retention_days,
            sources,
            metrics_addr,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("invalid {key}={raw:?}: {e}")),
    }
}

fn parse_sources(list: &str) -> Result<Vec<MarketSource>> {
    let mut out = Vec::new();
    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let s: MarketSource = part.parse()?;
        if !out.contains(&s) {
            out.push(s);
        }
    }
    if out.is_empty() {
        bail!("ENABLED_SOURCES must name at least one source");
    }
    Ok(out)
}
