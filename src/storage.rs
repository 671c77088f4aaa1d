// src/storage.rs
//! SQLite-backed record of market events that were already announced.
//!
//! - One row per `(id, source)`; inserts are `INSERT OR IGNORE`, so marking
//!   twice is a no-op.
//! - `first_seen_at` is written once and only read by retention pruning.
//! - Batch inserts run in one transaction; an error drops the transaction,
//!   which rolls it back, so a retry sees either all rows or none.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, gauge};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::model::{MarketEvent, MarketSource};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS seen_markets (
        id TEXT NOT NULL,
        source TEXT NOT NULL,
        title TEXT,
        url TEXT,
        category TEXT,
        first_seen_at TEXT NOT NULL,
        PRIMARY KEY (id, source)
    );
    CREATE INDEX IF NOT EXISTS idx_first_seen_at ON seen_markets (first_seen_at);
";

const INSERT_SEEN: &str = "
    INSERT OR IGNORE INTO seen_markets
        (id, source, title, url, category, first_seen_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
";

// Fixed-width UTC text so lexical order in SQLite matches time order.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: u64,
    pub by_source: BTreeMap<String, u64>,
}

#[derive(Debug)]
pub struct SeenStore {
    conn: Mutex<Connection>,
}

impl SeenStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("creating database directory {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening seen store at {}", path.display()))?;
        let store = Self::init(conn)?;
        tracing::info!(path = %path.display(), "seen store initialized");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory seen store")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .context("setting busy timeout")?;
        conn.execute_batch(SCHEMA).context("creating seen_markets schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("seen store mutex poisoned"))
    }

    pub fn is_seen(&self, id: &str, source: MarketSource) -> Result<bool> {
        let conn = self.lock()?;
        let hit = conn
            .query_row(
                "SELECT 1 FROM seen_markets WHERE id = ?1 AND source = ?2",
                params![id, source.as_str()],
                |_| Ok(()),
            )
            .optional()
            .context("querying seen_markets")?;
        Ok(hit.is_some())
    }

    pub fn mark_seen(&self, event: &MarketEvent) -> Result<()> {
        self.mark_seen_at(event, Utc::now())
    }

    /// Insert with an explicit first-seen time. Existing rows are left untouched.
    pub fn mark_seen_at(&self, event: &MarketEvent, seen_at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            INSERT_SEEN,
            params![
                event.id,
                event.source.as_str(),
                event.title,
                event.url,
                event.category,
                format_ts(seen_at),
            ],
        )
        .with_context(|| format!("marking {}:{} seen", event.source, event.id))?;
        Ok(())
    }

    /// Mark a batch seen atomically. Returns the number of rows actually inserted.
    pub fn mark_many_seen(&self, events: &[MarketEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let now = format_ts(Utc::now());
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("starting seen_markets transaction")?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare_cached(INSERT_SEEN)?;
            for ev in events {
                inserted += stmt
                    .execute(params![
                        ev.id,
                        ev.source.as_str(),
                        ev.title,
                        ev.url,
                        ev.category,
                        now,
                    ])
                    .with_context(|| format!("marking {}:{} seen", ev.source, ev.id))?;
            }
        }
        tx.commit().context("committing seen_markets transaction")?;
        tracing::debug!(requested = events.len(), inserted, "batch marked seen");
        Ok(inserted)
    }

    /// Events not yet in the store, in their original order.
    pub fn filter_new(&self, events: &[MarketEvent]) -> Result<Vec<MarketEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached("SELECT 1 FROM seen_markets WHERE id = ?1 AND source = ?2")
            .context("preparing seen lookup")?;
        let mut out = Vec::new();
        for ev in events {
            if !stmt.exists(params![ev.id, ev.source.as_str()])? {
                out.push(ev.clone());
            }
        }
        Ok(out)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM seen_markets", [], |row| row.get(0))
            .context("counting seen_markets")?;

        let mut stmt =
            conn.prepare("SELECT source, COUNT(*) FROM seen_markets GROUP BY source")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut by_source = BTreeMap::new();
        for row in rows {
            let (source, n) = row?;
            by_source.insert(source, n.max(0) as u64);
        }

        let total = total.max(0) as u64;
        gauge!("seen_markets_total").set(total as f64);
        Ok(StoreStats { total, by_source })
    }

    pub fn prune_older_than(&self, days: i64) -> Result<usize> {
        self.prune_older_than_at(days, Utc::now())
    }

    /// Delete rows first seen strictly before `now - days`.
    pub fn prune_older_than_at(&self, days: i64, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = ChronoDuration::try_days(days)
            .and_then(|age| now.checked_sub_signed(age))
            .ok_or_else(|| anyhow!("retention of {days} days is out of range"))?;
        let cutoff = format_ts(cutoff);
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM seen_markets WHERE first_seen_at < ?1",
                params![cutoff],
            )
            .context("pruning seen_markets")?;
        if deleted > 0 {
            tracing::info!(deleted, days, "pruned old seen entries");
            counter!("seen_pruned_total").increment(deleted as u64);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(id: &str, source: MarketSource) -> MarketEvent {
        MarketEvent::new(id, source, format!("Market {id}"))
    }

    #[test]
    fn marked_event_is_seen_and_others_are_not() {
        let store = SeenStore::open_in_memory().unwrap();
        store.mark_seen(&ev("a", MarketSource::Polymarket)).unwrap();

        assert!(store.is_seen("a", MarketSource::Polymarket).unwrap());
        assert!(!store.is_seen("a", MarketSource::Kalshi).unwrap());
        assert!(!store.is_seen("b", MarketSource::Polymarket).unwrap());
    }

    #[test]
    fn mark_seen_twice_keeps_one_row() {
        let store = SeenStore::open_in_memory().unwrap();
        let e = ev("dup", MarketSource::Kalshi);
        store.mark_seen(&e).unwrap();
        store.mark_seen(&e).unwrap();
        assert_eq!(store.stats().unwrap().total, 1);
    }

    #[test]
    fn first_seen_at_is_not_overwritten() {
        let store = SeenStore::open_in_memory().unwrap();
        let e = ev("x", MarketSource::Polymarket);
        let old = Utc::now() - ChronoDuration::days(100);
        store.mark_seen_at(&e, old).unwrap();
        store.mark_seen(&e).unwrap();
        // still old, so pruning removes it
        assert_eq!(store.prune_older_than(90).unwrap(), 1);
    }

    #[test]
    fn filter_new_preserves_order_and_passes_batch_duplicates() {
        let store = SeenStore::open_in_memory().unwrap();
        store.mark_seen(&ev("2", MarketSource::Polymarket)).unwrap();

        let batch = vec![
            ev("3", MarketSource::Kalshi),
            ev("2", MarketSource::Polymarket),
            ev("1", MarketSource::Polymarket),
            ev("3", MarketSource::Kalshi),
        ];
        let ids: Vec<_> = store
            .filter_new(&batch)
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["3", "1", "3"]);
    }

    #[test]
    fn mark_many_seen_ignores_duplicates_within_batch() {
        let store = SeenStore::open_in_memory().unwrap();
        let batch = vec![
            ev("1", MarketSource::Polymarket),
            ev("1", MarketSource::Polymarket),
            ev("1", MarketSource::Kalshi),
        ];
        assert_eq!(store.mark_many_seen(&batch).unwrap(), 2);
        // re-running is safe
        assert_eq!(store.mark_many_seen(&batch).unwrap(), 0);

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_source.get("polymarket"), Some(&1));
        assert_eq!(stats.by_source.get("kalshi"), Some(&1));
    }

    #[test]
    fn prune_respects_cutoff_boundary() {
        let store = SeenStore::open_in_memory().unwrap();
        let now = Utc::now();
        let cutoff = now - ChronoDuration::days(90);

        store
            .mark_seen_at(&ev("old", MarketSource::Kalshi), cutoff - ChronoDuration::seconds(1))
            .unwrap();
        store
            .mark_seen_at(&ev("edge", MarketSource::Kalshi), cutoff)
            .unwrap();
        store
            .mark_seen_at(&ev("fresh", MarketSource::Kalshi), now)
            .unwrap();

        assert_eq!(store.prune_older_than_at(90, now).unwrap(), 1);
        assert!(!store.is_seen("old", MarketSource::Kalshi).unwrap());
        assert!(store.is_seen("edge", MarketSource::Kalshi).unwrap());
        assert!(store.is_seen("fresh", MarketSource::Kalshi).unwrap());
    }

    #[test]
    fn prune_on_empty_store_removes_nothing() {
        let store = SeenStore::open_in_memory().unwrap();
        assert_eq!(store.prune_older_than(90).unwrap(), 0);
    }

    #[test]
    fn out_of_range_retention_is_an_error() {
        let store = SeenStore::open_in_memory().unwrap();
        store.mark_seen(&ev("keep", MarketSource::Kalshi)).unwrap();

        assert!(store.prune_older_than(1_000_000_000).is_err());
        assert!(store.prune_older_than(i64::MAX).is_err());
        assert!(store.is_seen("keep", MarketSource::Kalshi).unwrap());
    }

    #[test]
    fn timestamps_sort_lexically() {
        let a = Utc::now();
        let b = a + ChronoDuration::milliseconds(1);
        assert!(format_ts(a) < format_ts(b));
    }
}
