//! Renders a sample batch through the dispatcher. Posts to
//! DISCORD_WEBHOOK_URL when set, otherwise prints each payload as JSON.

use anyhow::Result;
use market_events_bot::notify::discord::DiscordWebhook;
use market_events_bot::notify::{Delivery, NotifyChannel, WebhookPayload};
use market_events_bot::{Dispatcher, MarketEvent, MarketSource, WebhookIdentity};
use std::time::Duration;

struct StdoutChannel;

#[async_trait::async_trait]
impl NotifyChannel for StdoutChannel {
    async fn post(&self, payload: &WebhookPayload) -> Result<Delivery> {
        println!("{}", serde_json::to_string_pretty(payload)?);
        Ok(Delivery::Delivered)
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let channel: Box<dyn NotifyChannel> = match std::env::var("DISCORD_WEBHOOK_URL") {
        Ok(url) if !url.trim().is_empty() => Box::new(DiscordWebhook::new(url)),
        _ => Box::new(StdoutChannel),
    };
    let mut dispatcher = Dispatcher::new(
        channel,
        WebhookIdentity {
            username: "Market Events (demo)".into(),
            avatar_url: None,
        },
    )
    .with_cooldown(Duration::from_millis(400));

    let batch = vec![
        MarketEvent::new("demo-1", MarketSource::Polymarket, "Will it rain in London tomorrow?")
            .with_category("Weather")
            .with_url("https://polymarket.com/event/demo-1")
            .with_description("Demo market, resolves on the Met Office daily summary."),
        MarketEvent::new("DEMO-2", MarketSource::Kalshi, "Fed funds rate above 4%")
            .with_category("Economics")
            .with_url("https://kalshi.com/markets/DEMO-2"),
        MarketEvent::new("demo-3", MarketSource::Polymarket, "Largest company by market cap")
            .with_category("Economics")
            .with_url("https://polymarket.com/event/demo-3"),
    ];

    let posted = dispatcher.post_grouped(&batch).await;
    println!("dispatch-demo done: {}/{} delivered", posted.len(), batch.len());
}
