use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chatlink_protocols::{BridgeError, Command};

use crate::settings::{MemorySettings, Settings, SettingsStore};

use super::*;

fn client_for(server: &MockServer) -> ApiClient {
    let store = MemorySettings::new(Settings {
        base_url: Some(server.uri()),
        token: Some("tok".to_string()),
        ..Settings::default()
    });
    ApiClient::new(store.watch())
}

#[tokio::test]
async fn exec_posts_the_serialized_command() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exec"))
        .and(header("authorization", "Bearer tok"))
        .and(body_json(serde_json::json!({
            "name": "search",
            "args": {"q": "cats"},
            "callId": "42",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "output": "42 results",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let command = Command::new("search").with_arg("q", "cats").with_call_id("42");
    let response = client.exec(&command).await.unwrap();
    assert_eq!(response.output.as_deref(), Some("42 results"));
    assert!(!response.stop_stream);
}

#[tokio::test]
async fn exec_maps_401_to_auth_error_regardless_of_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exec"))
        .respond_with(ResponseTemplate::new(401).set_body_string("irrelevant"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.exec(&Command::new("x")).await.unwrap_err();
    assert!(matches!(err, BridgeError::Auth));
}

#[tokio::test]
async fn exec_maps_other_failures_to_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exec"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.exec(&Command::new("x")).await.unwrap_err();
    assert!(matches!(err, BridgeError::Http(502)));
}

#[tokio::test]
async fn exec_without_base_url_is_a_configuration_error() {
    let store = MemorySettings::default();
    let client = ApiClient::new(store.watch());
    let err = client.exec(&Command::new("x")).await.unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
}

#[tokio::test]
async fn post_reply_sends_request_id_and_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/reply"))
        .and(body_json(serde_json::json!({
            "request_id": "r1",
            "content": "the reply",
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.post_reply("r1", "the reply").await.unwrap();
}

#[tokio::test]
async fn skills_listing_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/skills"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "skills": [{"name": "deploy", "description": "ship it"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let first = client.skills().await;
    let second = client.skills().await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].name, "deploy");
    assert_eq!(first, second);
}

#[tokio::test]
async fn skills_failures_degrade_to_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/skills"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.skills().await.is_empty());
}

#[tokio::test]
async fn file_listing_is_cached_per_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("q", "src"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": ["src/main.rs"],
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("q", "doc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": ["docs/readme.md"],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.files("src").await, vec!["src/main.rs"]);
    assert_eq!(client.files("src").await, vec!["src/main.rs"]);
    assert_eq!(client.files("doc").await, vec!["docs/readme.md"]);
}

#[tokio::test]
async fn init_prompt_returns_body_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("You are connected."))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.init_prompt().await.unwrap(), "You are connected.");
}

#[tokio::test]
async fn settings_changes_apply_without_rebuilding() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exec"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"output": "ok"})))
        .mount(&server)
        .await;

    let store = MemorySettings::default();
    let client = ApiClient::new(store.watch());
    assert!(matches!(
        client.exec(&Command::new("x")).await,
        Err(BridgeError::Configuration(_))
    ));

    store.update(|s| s.base_url = Some(server.uri()));
    assert!(client.exec(&Command::new("x")).await.is_ok());
}
