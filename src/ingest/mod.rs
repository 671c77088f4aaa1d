// src/ingest/mod.rs
pub mod http;
pub mod providers;
pub mod types;

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;

use crate::ingest::types::EventSource;
use crate::model::MarketEvent;
use crate::storage::SeenStore;
use crate::telemetry::ensure_metrics_described;

/// Normalize display text: decode entities, strip tags, collapse whitespace,
/// cap at `max_chars`.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[a-z][^>]*>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}

/// Parse an RFC 3339 timestamp, also accepting a bare date (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Keep events whose expiration is unknown or at least `min_hours` away.
/// A window too large for chrono to represent is never met.
pub fn passes_expiration(
    end_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    min_hours: i64,
) -> bool {
    let Some(end) = end_date else {
        return true;
    };
    match ChronoDuration::try_hours(min_hours) {
        Some(window) => end.signed_duration_since(now) >= window,
        None => false,
    }
}

/// Fetch from every source in turn. A failing source is logged and
/// contributes nothing; the others are unaffected.
pub async fn fetch_all(sources: &[Box<dyn EventSource>]) -> Vec<MarketEvent> {
    ensure_metrics_described();

    let mut all = Vec::new();
    for s in sources {
        match s.fetch_events().await {
            Ok(mut v) => {
                tracing::info!(source = %s.source(), count = v.len(), "fetched events");
                all.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(error = ?e, source = %s.source(), "source error");
                counter!("market_source_errors_total", "source" => s.source().as_str())
                    .increment(1);
            }
        }
    }
    counter!("market_events_fetched_total").increment(all.len() as u64);
    all
}

/// Subset of `events` never recorded in `store`, in original order. Repeats
/// within one batch all pass; the store's insert-if-absent absorbs them.
pub fn filter_new(events: &[MarketEvent], store: &SeenStore) -> Result<Vec<MarketEvent>> {
    let fresh = store.filter_new(events)?;
    counter!("market_events_new_total").increment(fresh.len() as u64);
    tracing::debug!(total = events.len(), new = fresh.len(), "dedup against seen store");
    Ok(fresh)
}
