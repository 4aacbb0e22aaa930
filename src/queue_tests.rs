use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chatlink_protocols::{Command, Node};

use crate::api::ApiClient;
use crate::correlator::{CorrelatorConfig, ReplyCorrelator};
use crate::dedup::{DedupKey, DedupStore, MemoryDedupStore};
use crate::settings::{MemorySettings, Settings, SettingsStore};
use crate::sim::SimPage;

use super::{EMPTY_RESPONSE, ExecutionQueue, QueueConfig, QueueTask};

struct Harness {
    queue: ExecutionQueue,
    page: Arc<SimPage>,
    store: Arc<MemoryDedupStore>,
}

fn harness(base_url: Option<String>, auto_send: bool) -> Harness {
    harness_with(base_url, auto_send, SimPage::new(), CorrelatorConfig::default())
}

fn harness_with(
    base_url: Option<String>,
    auto_send: bool,
    page: SimPage,
    correlator_config: CorrelatorConfig,
) -> Harness {
    let settings = MemorySettings::new(Settings {
        enabled: true,
        base_url,
        token: Some("tok".to_string()),
        auto_send,
        delay_min_s: 0,
        delay_max_s: 0,
        auto_execute: true,
    });
    let page = Arc::new(page);
    let api = Arc::new(ApiClient::new(settings.watch()));
    let store = Arc::new(MemoryDedupStore::new());
    let correlator = Arc::new(ReplyCorrelator::new(
        page.clone(),
        page.clone(),
        correlator_config,
    ));
    let queue = ExecutionQueue::spawn(
        api,
        page.clone(),
        store.clone(),
        correlator,
        settings.watch(),
        QueueConfig {
            stop_settle: Duration::from_millis(20),
        },
    );
    Harness { queue, page, store }
}

#[tokio::test]
async fn executes_command_and_appends_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exec"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": "42 results" })))
        .mount(&server)
        .await;

    let h = harness(Some(server.uri()), false);
    let command = Command::new("search").with_arg("q", "cats");
    let key = DedupKey::derive("conv", &command, "<tool/>");
    h.queue.enqueue(QueueTask::Execute {
        command,
        key: Some(key.clone()),
    });
    h.queue.shutdown().await;

    assert_eq!(h.page.input_text(), "42 results");
    assert!(h.store.is_handled(&key).await);
}

#[tokio::test]
async fn tasks_run_in_submission_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exec"))
        .and(body_string_contains("\"name\":\"slow\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "output": "slow done" }))
                .set_delay(Duration::from_millis(150)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/exec"))
        .and(body_string_contains("\"name\":\"fast\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": "fast done" })))
        .mount(&server)
        .await;

    let h = harness(Some(server.uri()), false);
    h.queue.enqueue(QueueTask::Execute {
        command: Command::new("slow"),
        key: None,
    });
    h.queue.enqueue(QueueTask::Execute {
        command: Command::new("fast"),
        key: None,
    });
    h.queue.shutdown().await;

    // The slow task finishes before the fast one even starts.
    assert_eq!(h.page.input_text(), "slow done\nfast done");
}

#[tokio::test]
async fn auth_failure_writes_reauth_guidance_without_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exec"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let h = harness(Some(server.uri()), true);
    h.queue.enqueue(QueueTask::Execute {
        command: Command::new("search"),
        key: None,
    });
    h.queue.shutdown().await;

    assert!(h.page.input_text().contains("Re-enter the access token"));
    assert!(h.page.sent_prompts().is_empty());
}

#[tokio::test]
async fn http_failure_becomes_error_text_and_queue_survives() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exec"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let h = harness(Some(server.uri()), false);
    h.queue.enqueue(QueueTask::Execute {
        command: Command::new("search"),
        key: None,
    });
    h.queue.enqueue(QueueTask::Fill {
        text: "still alive".to_string(),
        auto_send: false,
    });
    h.queue.shutdown().await;

    assert_eq!(
        h.page.input_text(),
        "[chatlink error] HTTP 502\nstill alive"
    );
}

#[tokio::test]
async fn missing_configuration_writes_guidance() {
    let h = harness(None, false);
    h.queue.enqueue(QueueTask::Execute {
        command: Command::new("search"),
        key: None,
    });
    h.queue.shutdown().await;

    assert!(h.page.input_text().contains("Configure the backend address"));
}

#[tokio::test]
async fn stop_stream_clicks_stop_before_writing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exec"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "output": "done", "stopStream": true })),
        )
        .mount(&server)
        .await;

    let h = harness(Some(server.uri()), false);
    h.queue.enqueue(QueueTask::Execute {
        command: Command::new("long_task"),
        key: None,
    });
    h.queue.shutdown().await;

    assert_eq!(h.page.stop_clicks(), 1);
    assert_eq!(h.page.input_text(), "done");
}

#[tokio::test]
async fn empty_success_uses_placeholder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exec"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let h = harness(Some(server.uri()), false);
    h.queue.enqueue(QueueTask::Execute {
        command: Command::new("noop"),
        key: None,
    });
    h.queue.shutdown().await;

    assert_eq!(h.page.input_text(), EMPTY_RESPONSE);
}

#[tokio::test]
async fn successful_result_is_auto_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exec"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": "sent text" })))
        .mount(&server)
        .await;

    let h = harness(Some(server.uri()), true);
    h.queue.enqueue(QueueTask::Execute {
        command: Command::new("search"),
        key: None,
    });
    h.queue.shutdown().await;

    assert_eq!(h.page.sent_prompts(), vec!["sent text".to_string()]);
    assert!(h.page.input_text().is_empty());
}

#[tokio::test]
async fn proxy_delivers_stabilized_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/reply"))
        .and(body_json(json!({
            "request_id": "req-1",
            "content": "the reply",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = CorrelatorConfig {
        submit_settle: Duration::from_millis(10),
        stabilize: Duration::from_millis(50),
        deadline: Duration::from_secs(5),
        fallback_wait: Duration::from_millis(10),
    };
    let h = harness_with(Some(server.uri()), false, SimPage::new(), config);

    // Stream the reply once the prompt lands.
    let page = h.page.clone();
    tokio::spawn(async move {
        while page.sent_prompts().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        page.push_region(Node::element("div", vec![Node::text("the reply")]));
    });

    h.queue.enqueue(QueueTask::Proxy(chatlink_protocols::ProxyRequest {
        request_id: "req-1".to_string(),
        prompt: "what is the answer?".to_string(),
    }));
    h.queue.shutdown().await;

    assert_eq!(h.page.sent_prompts(), vec!["what is the answer?".to_string()]);
}

#[tokio::test]
async fn failed_proxy_still_answers_the_caller() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/reply"))
        .and(body_string_contains("[proxy error]"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    // Nothing ever mutates, so the correlation hits its deadline.
    let config = CorrelatorConfig {
        submit_settle: Duration::from_millis(10),
        stabilize: Duration::from_millis(50),
        deadline: Duration::from_millis(100),
        fallback_wait: Duration::from_millis(10),
    };
    let h = harness_with(Some(server.uri()), false, SimPage::new(), config);

    h.queue.enqueue(QueueTask::Proxy(chatlink_protocols::ProxyRequest {
        request_id: "req-9".to_string(),
        prompt: "anyone there?".to_string(),
    }));
    h.queue.shutdown().await;
}
