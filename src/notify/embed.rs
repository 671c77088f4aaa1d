// src/notify/embed.rs
//! Discord webhook payload shapes and the rendering of market events into them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::model::{MarketEvent, MarketSource, NEUTRAL_COLOR};

pub const TITLE_LIMIT: usize = 256;
pub const DESCRIPTION_LIMIT: usize = 4096;
pub const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub embeds: Vec<Embed>,
}

/// Cut `s` to at most `max_chars` characters, ending in `...` when shortened.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let marker = ELLIPSIS.chars().count();
    if max_chars < marker {
        return s.chars().take(max_chars).collect();
    }
    let mut out: String = s.chars().take(max_chars - marker).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Events sharing a category, with their positions in the input batch.
#[derive(Debug, Clone)]
pub struct CategoryGroup<'a> {
    pub category: String,
    pub events: Vec<&'a MarketEvent>,
    pub indices: Vec<usize>,
}

/// Partition by category, ordered by first appearance.
pub fn group_by_category(events: &[MarketEvent]) -> Vec<CategoryGroup<'_>> {
    let mut groups: Vec<CategoryGroup<'_>> = Vec::new();
    let mut slot: HashMap<&str, usize> = HashMap::new();

    for (i, ev) in events.iter().enumerate() {
        let cat = ev.category_or_unknown();
        let at = *slot.entry(cat).or_insert_with(|| {
            groups.push(CategoryGroup {
                category: cat.to_string(),
                events: Vec::new(),
                indices: Vec::new(),
            });
            groups.len() - 1
        });
        groups[at].events.push(ev);
        groups[at].indices.push(i);
    }
    groups
}

pub fn render_group(group: &CategoryGroup<'_>) -> Embed {
    match group.events.as_slice() {
        [single] => individual_embed(single),
        many => summary_embed(&group.category, many),
    }
}

pub fn individual_embed(ev: &MarketEvent) -> Embed {
    let name = ev.source.display_name();
    Embed {
        title: truncate_with_ellipsis(&ev.title, TITLE_LIMIT),
        url: non_empty(&ev.url),
        description: non_empty(&ev.description)
            .map(|d| truncate_with_ellipsis(&d, DESCRIPTION_LIMIT)),
        color: ev.source.color(),
        fields: vec![
            EmbedField {
                name: "Source".into(),
                value: format!("{} {}", ev.source.icon(), name),
                inline: true,
            },
            EmbedField {
                name: "Category".into(),
                value: ev.category_or_unknown().to_string(),
                inline: true,
            },
        ],
        footer: Some(EmbedFooter {
            text: format!("New {name} Event"),
        }),
        timestamp: ev.created_at.map(|t| t.to_rfc3339()),
    }
}

pub fn summary_embed(category: &str, events: &[&MarketEvent]) -> Embed {
    let lines: Vec<String> = events
        .iter()
        .map(|ev| {
            let icon = ev.source.icon();
            if ev.url.trim().is_empty() {
                format!("{icon} {}", ev.title)
            } else {
                format!("{icon} [{}]({})", ev.title, ev.url)
            }
        })
        .collect();

    let sources: BTreeSet<MarketSource> = events.iter().map(|e| e.source).collect();
    let color = match sources.iter().next() {
        Some(only) if sources.len() == 1 => only.color(),
        _ => NEUTRAL_COLOR,
    };
    let footer = sources
        .iter()
        .map(|s| s.display_name())
        .collect::<Vec<_>>()
        .join(", ");

    Embed {
        title: truncate_with_ellipsis(
            &format!("{} New {} Markets", events.len(), category),
            TITLE_LIMIT,
        ),
        url: None,
        description: Some(truncate_with_ellipsis(&lines.join("\n"), DESCRIPTION_LIMIT)),
        color,
        fields: Vec::new(),
        footer: Some(EmbedFooter { text: footer }),
        timestamp: None,
    }
}

/// What the one-shot status message reports.
#[derive(Debug, Clone)]
pub struct StartupInfo {
    pub poll_interval_secs: u64,
    pub min_hours_to_expiration: i64,
    pub sources: Vec<MarketSource>,
}

pub fn startup_embed(info: &StartupInfo) -> Embed {
    let interval = if info.poll_interval_secs % 60 == 0 {
        format!("{} minutes", info.poll_interval_secs / 60)
    } else {
        format!("{} seconds", info.poll_interval_secs)
    };
    let hours = info.min_hours_to_expiration;
    let min_duration = if hours >= 24 {
        format!("{}+ days", hours / 24)
    } else {
        format!("{hours}+ hours")
    };
    let names: Vec<&str> = info.sources.iter().map(|s| s.display_name()).collect();
    let source_lines: Vec<String> = info
        .sources
        .iter()
        .map(|s| format!("{} {}", s.icon(), s.display_name()))
        .collect();

    Embed {
        title: "Market Events Bot Started".into(),
        url: None,
        description: Some(format!(
            "Now monitoring {} for new events.",
            names.join(" and ")
        )),
        color: NEUTRAL_COLOR,
        fields: vec![
            EmbedField {
                name: "Poll Interval".into(),
                value: interval,
                inline: true,
            },
            EmbedField {
                name: "Min Duration".into(),
                value: min_duration,
                inline: true,
            },
            EmbedField {
                name: "Sources".into(),
                value: source_lines.join("\n"),
                inline: true,
            },
        ],
        footer: None,
        timestamp: None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}
