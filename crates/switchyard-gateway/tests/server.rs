use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_core::{CoreResult, Credentials, ModelExecutor, NativeProvider};
use switchyard_gateway::{GatewayConfig, GatewayError, GatewayServer};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct EchoNative {
    delay: Duration,
}

#[async_trait]
impl NativeProvider for EchoNative {
    async fn complete(&self, prompt: &str) -> CoreResult<String> {
        tokio::time::sleep(self.delay).await;
        Ok(format!("claude says: {}", prompt))
    }
}

fn executor(ollama: Option<String>, delay: Duration) -> Arc<ModelExecutor> {
    let credentials = Credentials::default().with_env(move |name| match name {
        "OLLAMA_BASE_URL" => ollama.clone(),
        _ => None,
    });
    Arc::new(ModelExecutor::new(Arc::new(EchoNative { delay })).with_credentials(credentials))
}

async fn started(config: GatewayConfig, executor: Arc<ModelExecutor>) -> (GatewayServer, String) {
    let server = GatewayServer::new(executor, config);
    let addr = server.start().await.unwrap();
    (server, format!("http://{}", addr))
}

async fn default_server() -> (GatewayServer, String) {
    started(GatewayConfig::default(), executor(None, Duration::ZERO)).await
}

fn body(model: &str) -> Value {
    json!({
        "model": model,
        "max_tokens": 128,
        "messages": [{"role": "user", "content": "Hello"}],
        "metadata": {"user_id": "abc"}
    })
}

#[tokio::test]
async fn lifecycle_accessors() {
    let server = GatewayServer::new(executor(None, Duration::ZERO), GatewayConfig::default());
    assert_eq!(server.port(), 0);
    assert_eq!(server.address(), "");
    assert!(!server.is_running());

    let addr = server.start().await.unwrap();
    assert!(server.is_running());
    assert_ne!(server.port(), 0);
    assert_eq!(server.port(), addr.port());
    assert_eq!(server.address(), format!("127.0.0.1:{}", addr.port()));
    assert!(addr.ip().is_loopback());

    server.shutdown().await;
    assert!(!server.is_running());
    assert_eq!(server.port(), 0);
}

#[tokio::test]
async fn second_start_is_rejected() {
    let (server, _) = default_server().await;
    assert!(matches!(server.start().await, Err(GatewayError::AlreadyRunning(_))));
    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_is_idempotent_and_releases_port() {
    let (server, _) = default_server().await;
    let port = server.port();

    // Make sure a connection was actually served first.
    let response = reqwest::get(format!("http://127.0.0.1:{}/health", port)).await.unwrap();
    assert_eq!(response.status(), 200);

    server.shutdown().await;
    server.shutdown().await;

    let rebound = std::net::TcpListener::bind(("127.0.0.1", port));
    assert!(rebound.is_ok(), "port {} not released: {:?}", port, rebound.err());
    drop(rebound);

    // The server itself can come back up afterwards.
    server.start().await.unwrap();
    assert!(server.is_running());
    server.shutdown().await;
}

#[tokio::test]
async fn routing_status_codes() {
    let (server, base) = default_server().await;
    let client = reqwest::Client::new();

    let bad_json = client
        .post(format!("{}/v1/messages", base))
        .header("content-type", "application/json")
        .body("not-json")
        .send()
        .await
        .unwrap();
    assert_eq!(bad_json.status(), 400);
    let error: Value = bad_json.json().await.unwrap();
    assert_eq!(error["type"], "error");
    assert_eq!(error["error"]["type"], "invalid_request_error");

    let wrong_method = client.get(format!("{}/v1/messages", base)).send().await.unwrap();
    assert_eq!(wrong_method.status(), 405);

    let unknown = client.post(format!("{}/unknown", base)).send().await.unwrap();
    assert_eq!(unknown.status(), 404);
    assert_eq!(unknown.json::<Value>().await.unwrap(), json!({}));

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"status": "ok"}));

    server.shutdown().await;
}

#[tokio::test]
async fn unroutable_model_is_bad_request() {
    let (server, base) = default_server().await;
    let response = reqwest::Client::new()
        .post(format!("{}/v1/messages", base))
        .json(&body("gpt-4o"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    server.shutdown().await;
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let config = GatewayConfig {
        max_body_bytes: 256,
        ..GatewayConfig::default()
    };
    let (server, base) = started(config, executor(None, Duration::ZERO)).await;

    let mut big = body("claude");
    big["messages"][0]["content"] = Value::String("x".repeat(4096));
    let response = reqwest::Client::new()
        .post(format!("{}/v1/messages", base))
        .json(&big)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);
    server.shutdown().await;
}

#[tokio::test]
async fn native_model_is_served_directly() {
    let (server, base) = default_server().await;
    let response: Value = reqwest::Client::new()
        .post(format!("{}/v1/messages", base))
        .json(&body("claude"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["type"], "message");
    assert_eq!(response["role"], "assistant");
    assert_eq!(response["content"][0]["type"], "text");
    assert_eq!(response["content"][0]["text"], "claude says: Hello");
    assert!(response["id"].as_str().unwrap().starts_with("msg_"));
    server.shutdown().await;
}

#[tokio::test]
async fn proxied_request_round_trips_through_ollama() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-9",
            "choices": [{
                "message": {"role": "assistant", "content": null, "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "read_file", "arguments": "{\"path\":\"README.md\"}"}
                }]},
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 8}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let (server, base) = started(
        GatewayConfig::default(),
        executor(Some(upstream.uri()), Duration::ZERO),
    )
    .await;

    let response = reqwest::Client::new()
        .post(format!("{}/v1/messages", base))
        .json(&body("ollama/llama3.1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let response: Value = response.json().await.unwrap();

    assert_eq!(response["model"], "ollama/llama3.1");
    assert_eq!(response["stop_reason"], "tool_use");
    assert_eq!(response["content"][0]["type"], "tool_use");
    assert_eq!(response["content"][0]["id"], "call_1");
    assert_eq!(response["content"][0]["input"], json!({"path": "README.md"}));
    assert_eq!(response["usage"]["input_tokens"], 20);

    // Anthropic-only fields never reach the provider.
    let forwarded: Value = upstream.received_requests().await.unwrap()[0].body_json().unwrap();
    assert!(forwarded.get("metadata").is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn provider_error_message_is_passed_through() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "model 'nope' not found"})),
        )
        .mount(&upstream)
        .await;

    let (server, base) = started(
        GatewayConfig::default(),
        executor(Some(upstream.uri()), Duration::ZERO),
    )
    .await;

    let response = reqwest::Client::new()
        .post(format!("{}/v1/messages", base))
        .json(&body("ollama/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
    let error: Value = response.json().await.unwrap();
    assert!(error["error"]["message"]
        .as_str()
        .unwrap()
        .contains("model 'nope' not found"));
    server.shutdown().await;
}

#[tokio::test]
async fn fallback_serves_native_answer_when_enabled() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&upstream)
        .await;

    let config = GatewayConfig {
        fallback_enabled: true,
        ..GatewayConfig::default()
    };
    let (server, base) = started(config, executor(Some(upstream.uri()), Duration::ZERO)).await;

    let response: Value = reqwest::Client::new()
        .post(format!("{}/v1/messages", base))
        .json(&body("ollama/llama3.1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["content"][0]["text"], "claude says: Hello");
    server.shutdown().await;
}

#[tokio::test]
async fn streaming_relays_anthropic_events() {
    let upstream = MockServer::start().await;
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse),
        )
        .mount(&upstream)
        .await;

    let (server, base) = started(
        GatewayConfig::default(),
        executor(Some(upstream.uri()), Duration::ZERO),
    )
    .await;

    let mut request = body("ollama/llama3.1");
    request["stream"] = Value::Bool(true);
    let response = reqwest::Client::new()
        .post(format!("{}/v1/messages", base))
        .json(&request)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    let text = response.text().await.unwrap();
    assert!(text.starts_with("event: message_start\n"));
    assert!(text.contains("\"type\":\"text_delta\",\"text\":\"Hi\""));
    assert!(text.contains("event: message_stop"));

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_is_bounded_with_requests_in_flight() {
    let config = GatewayConfig {
        shutdown_grace_ms: 100,
        ..GatewayConfig::default()
    };
    let (server, base) = started(config, executor(None, Duration::from_secs(30))).await;
    let port = server.port();

    let in_flight = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("{}/v1/messages", base))
            .json(&body("claude"))
            .send()
            .await
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started_at = Instant::now();
    tokio::time::timeout(Duration::from_secs(5), server.shutdown())
        .await
        .expect("shutdown must not wait for the slow request");
    assert!(started_at.elapsed() < Duration::from_secs(5));
    assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());

    match in_flight.await.unwrap() {
        Ok(response) => assert_eq!(response.status(), 503),
        Err(_) => {}
    }
}
