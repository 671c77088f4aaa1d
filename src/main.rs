//! Market events bot — binary entrypoint.
//! Loads configuration, wires sources, store and webhook, then polls until
//! SIGINT/SIGTERM.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use market_events_bot::ingest::providers::{kalshi::KalshiSource, polymarket::PolymarketSource};
use market_events_bot::ingest::types::EventSource;
use market_events_bot::notify::discord::DiscordWebhook;
use market_events_bot::{
    telemetry, BotConfig, BotSettings, Dispatcher, MarketEventsBot, MarketSource, SeenStore,
    WebhookIdentity,
};
use tokio::sync::watch;

fn build_sources(cfg: &BotConfig) -> Result<Vec<Box<dyn EventSource>>> {
    let mut sources: Vec<Box<dyn EventSource>> = Vec::with_capacity(cfg.sources.len());
    for s in &cfg.sources {
        match s {
            MarketSource::Polymarket => sources.push(Box::new(PolymarketSource::new(
                cfg.polymarket_api_url.clone(),
                cfg.min_hours_to_expiration,
            )?)),
            MarketSource::Kalshi => sources.push(Box::new(KalshiSource::new(
                cfg.kalshi_api_url.clone(),
                cfg.min_hours_to_expiration,
            )?)),
        }
    }
    Ok(sources)
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
                    _ = term.recv() => tracing::info!("received SIGTERM"),
                }
                return;
            }
            Err(e) => tracing::warn!(error = ?e, "cannot install SIGTERM handler"),
        }
    }
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("received SIGINT");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = match BotConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("configuration error: {e:#}");
            return ExitCode::from(1);
        }
    };

    if let Some(addr) = cfg.metrics_addr {
        if let Err(e) = telemetry::install_prometheus(addr) {
            tracing::warn!(error = ?e, "metrics exporter disabled");
        }
    }

    let store = match SeenStore::open(&cfg.database_path) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("cannot open seen store: {e:#}");
            return ExitCode::from(1);
        }
    };
    let sources = match build_sources(&cfg) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("cannot build source clients: {e:#}");
            return ExitCode::from(1);
        }
    };

    let channel = DiscordWebhook::new(cfg.discord_webhook_url.clone());
    let dispatcher = Dispatcher::new(
        Box::new(channel),
        WebhookIdentity {
            username: cfg.bot_username.clone(),
            avatar_url: cfg.bot_avatar_url.clone(),
        },
    );
    let settings = BotSettings {
        poll_interval: Duration::from_secs(cfg.poll_interval_secs),
        retention_days: cfg.retention_days,
        min_hours_to_expiration: cfg.min_hours_to_expiration,
    };
    let mut bot = MarketEventsBot::new(store, dispatcher, sources, settings);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("stopping bot after the current cycle");
        let _ = stop_tx.send(true);
    });

    bot.run(stop_rx).await;
    ExitCode::SUCCESS
}
