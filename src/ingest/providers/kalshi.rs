use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{MAX_PAGES, PAGE_LIMIT};
use crate::ingest::types::EventSource;
use crate::ingest::{http, normalize_text, parse_timestamp, passes_expiration};
use crate::model::{MarketEvent, MarketSource, UNKNOWN_CATEGORY};

pub const DEFAULT_API_URL: &str = "https://api.elections.kalshi.com/trade-api/v2/events";

#[derive(Debug, Deserialize)]
struct KalshiMarket {
    close_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KalshiEvent {
    event_ticker: Option<String>,
    title: Option<String>,
    sub_title: Option<String>,
    category: Option<String>,
    strike_date: Option<String>,
    #[serde(default)]
    markets: Vec<KalshiMarket>,
}

pub struct KalshiSource {
    api_url: String,
    client: Client,
    min_hours_to_expiration: i64,
}

impl KalshiSource {
    pub fn new(api_url: impl Into<String>, min_hours_to_expiration: i64) -> Result<Self> {
        Ok(Self {
            api_url: api_url.into(),
            client: http::build_client()?,
            min_hours_to_expiration,
        })
    }

    pub fn parse_page(items: &[Value], now: DateTime<Utc>, min_hours: i64) -> Vec<MarketEvent> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let raw: KalshiEvent = match serde_json::from_value(item.clone()) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, source = "kalshi", "skipping malformed event");
                    continue;
                }
            };
            let Some(ev) = Self::to_event(raw) else {
                continue;
            };
            if passes_expiration(ev.end_date, now, min_hours) {
                out.push(ev);
            }
        }
        out
    }

    fn to_event(raw: KalshiEvent) -> Option<MarketEvent> {
        let ticker = raw.event_ticker.filter(|t| !t.trim().is_empty())?;

        let mut title = normalize_text(raw.title.as_deref().unwrap_or("Unknown"), usize::MAX);
        if let Some(sub) = raw.sub_title.as_deref().map(|s| normalize_text(s, usize::MAX)) {
            if !sub.is_empty() {
                title = format!("{title} - {sub}");
            }
        }

        // Events without a strike date expire with their last market.
        let end_date = raw.strike_date.as_deref().and_then(parse_timestamp).or_else(|| {
            raw.markets
                .iter()
                .filter_map(|m| m.close_time.as_deref().and_then(parse_timestamp))
                .max()
        });

        Some(MarketEvent {
            url: format!("https://kalshi.com/markets/{ticker}"),
            id: ticker,
            source: MarketSource::Kalshi,
            title,
            description: String::new(),
            category: raw
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string()),
            created_at: None,
            end_date,
        })
    }
}

#[async_trait]
impl EventSource for KalshiSource {
    async fn fetch_events(&self) -> Result<Vec<MarketEvent>> {
        let mut events = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query = vec![
                ("limit", PAGE_LIMIT.to_string()),
                ("status", "open".to_string()),
                ("with_nested_markets", "true".to_string()),
            ];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let body = match http::get_json(&self.client, &self.api_url, &query).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(error = ?e, source = "kalshi", "page fetch failed");
                    break;
                }
            };

            let items = body
                .get("events")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            events.extend(Self::parse_page(
                items,
                Utc::now(),
                self.min_hours_to_expiration,
            ));

            cursor = body
                .get("cursor")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if cursor.is_none() || items.is_empty() {
                break;
            }
        }

        Ok(events)
    }

    fn source(&self) -> MarketSource {
        MarketSource::Kalshi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn maps_ticker_title_and_url() {
        let items = vec![json!({
            "event_ticker": "KXFEDDECISION-25JUL",
            "title": "Fed decision in July",
            "sub_title": "Jul 30, 2025",
            "category": "Economics",
            "strike_date": "2025-07-30T18:00:00Z"
        })];
        let out = KalshiSource::parse_page(&items, now(), 24);
        assert_eq!(out.len(), 1);
        let ev = &out[0];
        assert_eq!(ev.id, "KXFEDDECISION-25JUL");
        assert_eq!(ev.title, "Fed decision in July - Jul 30, 2025");
        assert_eq!(ev.url, "https://kalshi.com/markets/KXFEDDECISION-25JUL");
        assert_eq!(ev.category, "Economics");
        assert!(ev.description.is_empty());
    }

    #[test]
    fn expiration_falls_back_to_latest_market_close() {
        let items = vec![
            json!({
                "event_ticker": "A",
                "markets": [
                    { "close_time": "2025-06-01T02:00:00Z" },
                    { "close_time": "2025-06-05T00:00:00Z" }
                ]
            }),
            json!({
                "event_ticker": "B",
                "markets": [{ "close_time": "2025-06-01T02:00:00Z" }]
            }),
            json!({ "title": "no ticker" }),
        ];
        let ids: Vec<_> = KalshiSource::parse_page(&items, now(), 24)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["A"]);
    }
}
