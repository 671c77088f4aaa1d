// tests/dispatch_grouped.rs
use market_events_bot::notify::embed::{DESCRIPTION_LIMIT, ELLIPSIS};
use market_events_bot::notify::{MockChannel, MockReply, StartupInfo};
use market_events_bot::{Dispatcher, MarketEvent, MarketSource, WebhookIdentity};
use std::time::Duration;
use tokio::time::Instant;

fn identity() -> WebhookIdentity {
    WebhookIdentity {
        username: "Market Events".into(),
        avatar_url: Some("https://example.test/avatar.png".into()),
    }
}

fn ev(id: &str, cat: &str) -> MarketEvent {
    MarketEvent::new(id, MarketSource::Polymarket, format!("Market {id}"))
        .with_category(cat)
        .with_url(format!("https://polymarket.com/event/{id}"))
}

#[tokio::test(start_paused = true)]
async fn two_in_a_one_in_b_gives_summary_then_individual() {
    let mock = MockChannel::new();
    let mut d = Dispatcher::new(Box::new(mock.clone()), identity());

    let batch = vec![ev("1", "A"), ev("2", "A"), ev("3", "B")];
    let posted = d.post_grouped(&batch).await;
    assert_eq!(posted, batch);

    let sent = mock.posted();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].username, "Market Events");
    assert_eq!(sent[0].embeds[0].title, "2 New A Markets");
    assert!(sent[0].embeds[0].fields.is_empty());
    assert_eq!(sent[1].embeds[0].title, "Market 3");
    assert_eq!(sent[1].embeds[0].fields[1].value, "B");
}

#[tokio::test(start_paused = true)]
async fn posts_are_spaced_by_the_cooldown() {
    let mock = MockChannel::new();
    let mut d = Dispatcher::new(Box::new(mock.clone()), identity());

    let start = Instant::now();
    d.post_grouped(&[ev("1", "A"), ev("2", "B"), ev("3", "C")]).await;

    assert_eq!(mock.posted().len(), 3);
    // first post is immediate, the next two wait 2s each
    assert!(Instant::now() - start >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn throttled_post_is_retried_once_after_retry_after() {
    let mock = MockChannel::with_script([MockReply::Throttle(Duration::from_secs(7))]);
    let mut d = Dispatcher::new(Box::new(mock.clone()), identity());

    let start = Instant::now();
    let posted = d.post_grouped(&[ev("1", "A")]).await;

    assert_eq!(posted.len(), 1);
    assert_eq!(mock.posted().len(), 2);
    assert!(Instant::now() - start >= Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn second_throttle_drops_the_group_and_continues() {
    let mock = MockChannel::with_script([
        MockReply::Throttle(Duration::from_secs(1)),
        MockReply::Throttle(Duration::from_secs(1)),
    ]);
    let mut d = Dispatcher::new(Box::new(mock.clone()), identity());

    let batch = vec![ev("1", "A"), ev("2", "B")];
    let posted = d.post_grouped(&batch).await;

    assert_eq!(posted, vec![ev("2", "B")]);
    // A: original + one retry, B: one post
    assert_eq!(mock.posted().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_group_is_excluded_and_order_is_preserved() {
    let mock = MockChannel::with_script([MockReply::Ok, MockReply::Fail("HTTP 500".into())]);
    let mut d = Dispatcher::new(Box::new(mock.clone()), identity());

    let batch = vec![ev("1", "A"), ev("2", "B"), ev("3", "A"), ev("4", "C")];
    let ids: Vec<_> = d
        .post_grouped(&batch)
        .await
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["1", "3", "4"]);
    // errors are not retried
    assert_eq!(mock.posted().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn long_description_is_truncated_with_ellipsis() {
    let mock = MockChannel::new();
    let mut d = Dispatcher::new(Box::new(mock.clone()), identity());

    let e = ev("1", "A").with_description("y".repeat(5000));
    d.post_grouped(&[e]).await;

    let desc = mock.posted()[0].embeds[0].description.clone().unwrap();
    assert!(desc.chars().count() <= DESCRIPTION_LIMIT);
    assert!(desc.ends_with(ELLIPSIS));
}

#[tokio::test(start_paused = true)]
async fn startup_message_is_sent_once_and_uses_the_cooldown() {
    let mock = MockChannel::new();
    let mut d = Dispatcher::new(Box::new(mock.clone()), identity());
    let info = StartupInfo {
        poll_interval_secs: 300,
        min_hours_to_expiration: 24,
        sources: vec![MarketSource::Polymarket],
    };

    let start = Instant::now();
    d.post_startup(&info).await.unwrap();
    d.post_startup(&info).await.unwrap();
    d.post_grouped(&[ev("1", "A")]).await;

    let sent = mock.posted();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].embeds[0].title, "Market Events Bot Started");
    assert!(Instant::now() - start >= Duration::from_secs(2));
}

#[tokio::test]
async fn empty_batch_posts_nothing() {
    let mock = MockChannel::new();
    let mut d = Dispatcher::new(Box::new(mock.clone()), identity());
    assert!(d.post_grouped(&[]).await.is_empty());
    assert!(mock.posted().is_empty());
}
