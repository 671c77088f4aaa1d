// src/bot.rs
//! Poll cycle driver: fetch → dedup → dispatch → mark seen, with a silent
//! initial sync and periodic retention pruning.

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use std::time::Duration;
use tokio::sync::watch;

use crate::ingest::{self, types::EventSource};
use crate::notify::{Dispatcher, StartupInfo};
use crate::storage::{SeenStore, StoreStats};
use crate::telemetry::ensure_metrics_described;

const SECS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Copy)]
pub struct BotSettings {
    pub poll_interval: Duration,
    pub retention_days: i64,
    pub min_hours_to_expiration: i64,
}

impl BotSettings {
    /// Cycles that add up to roughly one day at the poll interval (at least 1).
    pub fn cycles_per_day(&self) -> u64 {
        (SECS_PER_DAY / self.poll_interval.as_secs().max(1)).max(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub new: usize,
    pub posted: usize,
}

pub struct MarketEventsBot {
    store: SeenStore,
    dispatcher: Dispatcher,
    sources: Vec<Box<dyn EventSource>>,
    settings: BotSettings,
    cycle_count: u64,
}

impl MarketEventsBot {
    pub fn new(
        store: SeenStore,
        dispatcher: Dispatcher,
        sources: Vec<Box<dyn EventSource>>,
        settings: BotSettings,
    ) -> Self {
        ensure_metrics_described();
        Self {
            store,
            dispatcher,
            sources,
            settings,
            cycle_count: 0,
        }
    }

    pub fn store(&self) -> &SeenStore {
        &self.store
    }

    pub fn startup_info(&self) -> StartupInfo {
        StartupInfo {
            poll_interval_secs: self.settings.poll_interval.as_secs(),
            min_hours_to_expiration: self.settings.min_hours_to_expiration,
            sources: self.sources.iter().map(|s| s.source()).collect(),
        }
    }

    /// Mark everything currently listed as seen without posting, so the first
    /// run does not announce the whole backlog.
    pub async fn initial_sync(&mut self) -> Result<StoreStats> {
        tracing::info!("performing initial sync (marking existing events as seen)");
        let events = ingest::fetch_all(&self.sources).await;
        let inserted = self
            .store
            .mark_many_seen(&events)
            .context("initial sync: marking fetched events seen")?;
        let stats = self.store.stats()?;
        tracing::info!(
            fetched = events.len(),
            inserted,
            total = stats.total,
            by_source = ?stats.by_source,
            "initial sync complete"
        );
        Ok(stats)
    }

    /// One poll cycle. Only events whose group was delivered are marked seen;
    /// the rest stay new and are retried next cycle.
    pub async fn run_once(&mut self) -> Result<CycleReport> {
        tracing::info!("starting poll cycle");
        let events = ingest::fetch_all(&self.sources).await;
        let fresh = ingest::filter_new(&events, &self.store)?;

        let mut report = CycleReport {
            fetched: events.len(),
            new: fresh.len(),
            posted: 0,
        };
        if fresh.is_empty() {
            tracing::info!(fetched = report.fetched, "no new events found");
            return Ok(report);
        }

        let posted = self.dispatcher.post_grouped(&fresh).await;
        self.store
            .mark_many_seen(&posted)
            .context("marking posted events seen")?;
        report.posted = posted.len();
        counter!("market_events_posted_total").increment(posted.len() as u64);

        tracing::info!(
            fetched = report.fetched,
            new = report.new,
            posted = report.posted,
            "poll cycle complete"
        );
        Ok(report)
    }

    /// Count a finished cycle and prune when a day's worth has passed.
    /// Returns the number of pruned rows when pruning ran.
    pub fn after_cycle(&mut self) -> Result<Option<usize>> {
        self.cycle_count += 1;
        gauge!("poll_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        if self.cycle_count % self.settings.cycles_per_day() != 0 {
            return Ok(None);
        }
        let deleted = self.store.prune_older_than(self.settings.retention_days)?;
        Ok(Some(deleted))
    }

    /// Startup message, initial sync, then poll until `shutdown` turns true.
    /// Polling only starts once the initial sync succeeded; a failed sync is
    /// retried every interval. A stop request is honoured between steps and
    /// interrupts the sleep.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            "starting bot"
        );

        let info = self.startup_info();
        if let Err(e) = self.dispatcher.post_startup(&info).await {
            tracing::error!(error = ?e, "failed to post startup message");
        }

        loop {
            if *shutdown.borrow() {
                tracing::info!("bot stopped before initial sync completed");
                return;
            }
            match self.initial_sync().await {
                Ok(_) => break,
                Err(e) => {
                    tracing::error!(error = ?e, "initial sync failed, retrying next interval");
                    counter!("initial_sync_failures_total").increment(1);
                }
            }
            if self.sleep_or_stop(&mut shutdown).await {
                tracing::info!("bot stopped before initial sync completed");
                return;
            }
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.run_once().await {
                tracing::error!(error = ?e, "error in poll cycle");
            }
            if let Err(e) = self.after_cycle() {
                tracing::error!(error = ?e, "retention cleanup failed");
            }

            if self.sleep_or_stop(&mut shutdown).await {
                break;
            }
        }

        tracing::info!("bot stopped");
    }

    /// Wait one poll interval. Returns `true` when a stop was requested.
    async fn sleep_or_stop(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return true;
        }
        tracing::info!(
            secs = self.settings.poll_interval.as_secs(),
            "sleeping until next poll"
        );
        let sleep = tokio::time::sleep(self.settings.poll_interval);
        tokio::pin!(sleep);
        let sender_gone = tokio::select! {
            _ = &mut sleep => false,
            res = shutdown.wait_for(|stop| *stop) => res.is_err(),
        };
        // Nobody can stop us any more; finish the interval normally.
        if sender_gone {
            sleep.await;
        }
        *shutdown.borrow()
    }
}
