use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{DESCRIPTION_CAP, MAX_PAGES, PAGE_LIMIT};
use crate::ingest::types::EventSource;
use crate::ingest::{http, normalize_text, parse_timestamp, passes_expiration};
use crate::model::{MarketEvent, MarketSource, UNKNOWN_CATEGORY};

pub const DEFAULT_API_URL: &str = "https://gamma-api.polymarket.com/events";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GammaId {
    Text(String),
    Number(i64),
}

#[derive(Debug, Deserialize)]
struct GammaTag {
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaEvent {
    id: Option<GammaId>,
    title: Option<String>,
    description: Option<String>,
    slug: Option<String>,
    category: Option<String>,
    #[serde(default)]
    tags: Vec<GammaTag>,
    creation_date: Option<String>,
    created_at: Option<String>,
    end_date: Option<String>,
}

pub struct PolymarketSource {
    api_url: String,
    client: Client,
    min_hours_to_expiration: i64,
}

impl PolymarketSource {
    pub fn new(api_url: impl Into<String>, min_hours_to_expiration: i64) -> Result<Self> {
        Ok(Self {
            api_url: api_url.into(),
            client: http::build_client()?,
            min_hours_to_expiration,
        })
    }

    /// Map one page of the Gamma `/events` response. Items without an id are
    /// dropped quietly; malformed items are dropped with a warning.
    pub fn parse_page(items: &[Value], now: DateTime<Utc>, min_hours: i64) -> Vec<MarketEvent> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let raw: GammaEvent = match serde_json::from_value(item.clone()) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, source = "polymarket", "skipping malformed event");
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

    fn to_event(raw: GammaEvent) -> Option<MarketEvent> {
        let id = match raw.id? {
            GammaId::Text(s) if !s.trim().is_empty() => s,
            GammaId::Text(_) => return None,
            GammaId::Number(n) => n.to_string(),
        };

        let url = match raw.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => format!("https://polymarket.com/event/{slug}"),
            _ => String::new(),
        };

        let category = raw
            .category
            .filter(|c| !c.trim().is_empty())
            .or_else(|| raw.tags.into_iter().find_map(|t| t.label))
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());

        let title = normalize_text(raw.title.as_deref().unwrap_or("Unknown"), usize::MAX);

        Some(MarketEvent {
            id,
            source: MarketSource::Polymarket,
            title: if title.is_empty() { "Unknown".to_string() } else { title },
            description: normalize_text(
                raw.description.as_deref().unwrap_or_default(),
                DESCRIPTION_CAP,
            ),
            url,
            category,
            created_at: raw
                .creation_date
                .or(raw.created_at)
                .as_deref()
                .and_then(parse_timestamp),
            end_date: raw.end_date.as_deref().and_then(parse_timestamp),
        })
    }
}

#[async_trait]
impl EventSource for PolymarketSource {
    async fn fetch_events(&self) -> Result<Vec<MarketEvent>> {
        let mut events = Vec::new();
        let mut offset = 0usize;

        for _ in 0..MAX_PAGES {
            let query = [
                ("active", "true".to_string()),
                ("closed", "false".to_string()),
                ("limit", PAGE_LIMIT.to_string()),
                ("offset", offset.to_string()),
            ];
            let body = match http::get_json(&self.client, &self.api_url, &query).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(error = ?e, source = "polymarket", offset, "page fetch failed");
                    break;
                }
            };
            let Some(items) = body.as_array() else {
                tracing::error!(source = "polymarket", "unexpected response shape (not an array)");
                break;
            };
            if items.is_empty() {
                break;
            }

            events.extend(Self::parse_page(
                items,
                Utc::now(),
                self.min_hours_to_expiration,
            ));

            if items.len() < PAGE_LIMIT {
                break;
            }
            offset += PAGE_LIMIT;
        }

        Ok(events)
    }

    fn source(&self) -> MarketSource {
        MarketSource::Polymarket
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
    fn maps_gamma_event_fields() {
        let items = vec![json!({
            "id": "16085",
            "title": "Fed decision in July?",
            "description": "Resolves per the &quot;FOMC&quot; statement.",
            "slug": "fed-decision-in-july",
            "category": "Economy",
            "creationDate": "2025-05-01T12:00:00Z",
            "endDate": "2025-07-30T00:00:00Z"
        })];
        let out = PolymarketSource::parse_page(&items, now(), 24);
        assert_eq!(out.len(), 1);
        let ev = &out[0];
        assert_eq!(ev.id, "16085");
        assert_eq!(ev.source, MarketSource::Polymarket);
        assert_eq!(ev.url, "https://polymarket.com/event/fed-decision-in-july");
        assert_eq!(ev.category, "Economy");
        assert_eq!(ev.description, "Resolves per the \"FOMC\" statement.");
        assert!(ev.created_at.is_some());
    }

    #[test]
    fn numeric_ids_tags_and_defaults() {
        let items = vec![json!({
            "id": 77,
            "tags": [{ "label": "Sports" }, { "label": "NBA" }]
        })];
        let out = PolymarketSource::parse_page(&items, now(), 24);
        assert_eq!(out[0].id, "77");
        assert_eq!(out[0].title, "Unknown");
        assert_eq!(out[0].category, "Sports");
        assert_eq!(out[0].url, "");
    }

    #[test]
    fn skips_missing_ids_malformed_items_and_expiring_events() {
        let items = vec![
            json!({ "title": "no id" }),
            json!({ "id": "1", "title": 5 }),
            json!({ "id": "2", "title": "soon", "endDate": "2025-06-01T06:00:00Z" }),
            json!({ "id": "3", "title": "later", "endDate": "2025-06-03T00:00:00Z" }),
        ];
        let ids: Vec<_> = PolymarketSource::parse_page(&items, now(), 24)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["3"]);
    }
}
