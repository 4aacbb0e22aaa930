use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};

use chatlink_protocols::Node;

use crate::sim::SimPage;

use super::*;

fn reply(text: &str) -> Node {
    Node::element("model-response", vec![Node::element("p", vec![Node::text(text)])])
}

fn correlator_on(page: &Arc<SimPage>, config: CorrelatorConfig) -> ReplyCorrelator {
    ReplyCorrelator::new(page.clone(), page.clone(), config)
}

#[tokio::test(start_paused = true)]
async fn resolves_once_the_streamed_reply_stabilizes() {
    let page = Arc::new(SimPage::new());
    page.push_region(reply("earlier turn"));
    let correlator = correlator_on(&page, CorrelatorConfig::default());

    let task = {
        let correlator = Arc::new(correlator);
        let correlator = correlator.clone();
        tokio::spawn(async move { correlator.correlate("r1", "what is 6x7?").await })
    };

    // Wait past fill + settle + send so the watcher is armed.
    time::sleep(Duration::from_millis(500)).await;
    assert_eq!(page.sent_prompts(), vec!["what is 6x7?".to_string()]);

    let start = Instant::now();
    let region = page.push_region(reply("4"));
    time::sleep(Duration::from_millis(400)).await;
    page.update_region(region, reply("42"));
    time::sleep(Duration::from_millis(400)).await;
    page.update_region(region, reply("42."));
    time::sleep(Duration::from_millis(400)).await;
    page.update_region(region, reply("42. The answer."));

    let text = task.await.unwrap().unwrap();
    assert_eq!(text, "42. The answer.");
    // Resolved one stabilization period after the last change.
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_millis(2000) && elapsed < Duration::from_millis(2300),
        "resolved after {elapsed:?}"
    );
    // The mutation watcher is gone the instant the call resolves.
    assert_eq!(page.watcher_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn detects_in_place_updates_of_the_last_region() {
    let page = Arc::new(SimPage::new());
    let region = page.push_region(reply("previous text"));
    let correlator = Arc::new(correlator_on(&page, CorrelatorConfig::default()));

    let task = {
        let correlator = correlator.clone();
        tokio::spawn(async move { correlator.correlate("r2", "go").await })
    };

    time::sleep(Duration::from_millis(500)).await;
    // The platform reuses the same element and rewrites its text.
    page.update_region(region, reply("fresh reply"));

    let text = task.await.unwrap().unwrap();
    assert_eq!(text, "fresh reply");
}

#[tokio::test(start_paused = true)]
async fn times_out_when_nothing_ever_changes() {
    let page = Arc::new(SimPage::new());
    page.push_region(reply("old"));
    let correlator = Arc::new(correlator_on(&page, CorrelatorConfig::default()));

    let task = {
        let correlator = correlator.clone();
        tokio::spawn(async move { correlator.correlate("r3", "go").await })
    };

    let result = task.await.unwrap();
    assert!(matches!(result, Err(BridgeError::Timeout)));
    assert_eq!(page.watcher_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn irrelevant_mutations_do_not_resolve_the_call() {
    let page = Arc::new(SimPage::new());
    let region = page.push_region(reply("unchanged"));
    let config = CorrelatorConfig {
        deadline: Duration::from_secs(5),
        ..CorrelatorConfig::default()
    };
    let correlator = Arc::new(correlator_on(&page, config));

    let task = {
        let correlator = correlator.clone();
        tokio::spawn(async move { correlator.correlate("r4", "go").await })
    };

    // Notifications fire but neither the count nor the last text changes.
    for _ in 0..8 {
        time::sleep(Duration::from_millis(400)).await;
        page.touch(region);
    }

    let result = task.await.unwrap();
    assert!(matches!(result, Err(BridgeError::Timeout)));
}

#[tokio::test(start_paused = true)]
async fn falls_back_to_a_fixed_delay_without_observation() {
    let page = Arc::new(SimPage::new().without_watching());
    page.push_region(reply("stale"));
    let correlator = Arc::new(correlator_on(&page, CorrelatorConfig::default()));

    let start = Instant::now();
    let task = {
        let correlator = correlator.clone();
        let page = page.clone();
        tokio::spawn(async move {
            // The reply lands while the fixed delay runs.
            tokio::spawn(async move {
                time::sleep(Duration::from_secs(2)).await;
                page.push_region(reply("late but present"));
            });
            correlator.correlate("r5", "go").await
        })
    };

    let text = task.await.unwrap().unwrap();
    assert_eq!(text, "late but present");
    assert!(start.elapsed() >= Duration::from_secs(8));
}

#[tokio::test(start_paused = true)]
async fn reply_text_is_stripped_of_controls() {
    let page = Arc::new(SimPage::new());
    let correlator = Arc::new(correlator_on(&page, CorrelatorConfig::default()));

    let task = {
        let correlator = correlator.clone();
        tokio::spawn(async move { correlator.correlate("r6", "go").await })
    };

    time::sleep(Duration::from_millis(500)).await;
    page.push_region(Node::element(
        "model-response",
        vec![
            Node::element("p", vec![Node::text("the content")]),
            Node::element("button", vec![Node::text("Copy")]),
            Node::hidden("span", vec![Node::text("sparkle")]),
        ],
    ));

    let text = task.await.unwrap().unwrap();
    assert_eq!(text, "the content");
}
