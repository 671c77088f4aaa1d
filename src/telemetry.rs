// src/telemetry.rs
use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "market_events_fetched_total",
            "Events returned by all sources after the expiration filter."
        );
        describe_counter!(
            "market_events_new_total",
            "Fetched events not yet present in the seen store."
        );
        describe_counter!(
            "market_events_posted_total",
            "Events delivered to the webhook and marked seen."
        );
        describe_counter!(
            "market_source_errors_total",
            "Source fetch failures isolated by the poll cycle."
        );
        describe_counter!("webhook_posts_total", "Webhook payloads delivered.");
        describe_counter!(
            "webhook_throttled_total",
            "Webhook responses asking us to back off."
        );
        describe_counter!(
            "webhook_failures_total",
            "Webhook payloads dropped after failing delivery."
        );
        describe_counter!(
            "initial_sync_failures_total",
            "Initial sync attempts that failed and will be retried."
        );
        describe_counter!("seen_pruned_total", "Seen entries removed by retention.");
        describe_gauge!("seen_markets_total", "Rows in the seen store at last stats call.");
        describe_gauge!("poll_last_run_ts", "Unix ts when the last poll cycle finished.");
    });
}

/// Install the Prometheus recorder with its own HTTP listener on `addr`.
/// Must be called from inside a tokio runtime.
pub fn install_prometheus(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install recorder")?;
    ensure_metrics_described();
    tracing::info!(%addr, "prometheus exporter listening");
    Ok(())
}

/// Console logging. `RUST_LOG` drives the filter (default `info`);
/// `LOG_FORMAT=json` switches to one JSON object per line.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}
