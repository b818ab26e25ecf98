use mockito::Matcher;
use serde_json::json;
use std::time::Duration;
use surge_client::{Client, ClientConfig, DEFAULT_TIMEOUT};
use surge_common::{RequestSpec, SurgeError};

// Helper: a client aimed at the given mockito server URL.
fn client_for(server_url: &str) -> Client {
    Client::new(ClientConfig { base_url: server_url.to_string(), timeout: Duration::from_secs(5) })
        .expect("valid config")
}

// Helper: a client pointed at localhost:8080 for tests that never actually connect.
fn localhost_client() -> Client {
    Client::new(ClientConfig::default()).expect("valid config")
}

#[test]
fn test_client_config_default() {
    let config = ClientConfig::default();
    assert_eq!(config.base_url, "http://localhost:8080");
    assert_eq!(config.timeout, DEFAULT_TIMEOUT);
}

#[test]
fn test_client_rejects_base_url_without_scheme() {
    let result = Client::new(ClientConfig {
        base_url: "localhost:8080".to_string(),
        timeout: DEFAULT_TIMEOUT,
    });
    assert!(matches!(result, Err(SurgeError::Configuration(_))));
}

#[test]
fn test_build_url() {
    let client = localhost_client();
    assert_eq!(client.build_url("/health"), "http://localhost:8080/health");
    assert_eq!(client.build_url("health"), "http://localhost:8080/health");
    assert_eq!(client.build_url(""), "http://localhost:8080");
}

#[test]
fn test_build_url_trailing_slash_base() {
    let client = Client::new(ClientConfig {
        base_url: "http://example.com:3000/".to_string(),
        timeout: DEFAULT_TIMEOUT,
    })
    .unwrap();
    assert_eq!(client.build_url("/ready"), "http://example.com:3000/ready");
}

#[test]
fn test_build_url_absolute_passthrough() {
    let client = localhost_client();
    assert_eq!(
        client.build_url("https://other.example.com/x"),
        "https://other.example.com/x"
    );
}

#[tokio::test]
async fn test_get_reads_status_headers_and_body() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/health")
        .with_status(200)
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"status":"healthy"}"#)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let view = client.execute(&RequestSpec::get("/health")).await.unwrap();

    assert_eq!(view.status, 200);
    assert_eq!(view.header("content-type"), Some("application/json"));
    assert_eq!(view.json_field("status"), Some(json!("healthy")));
}

#[tokio::test]
async fn test_non_success_status_is_not_an_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/v1/validate")
        .with_status(500)
        .with_body(r#"{"error":"boom"}"#)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let view = client
        .execute(&RequestSpec::post_json("/api/v1/validate", json!({"amount": 1})))
        .await
        .unwrap();

    assert_eq!(view.status, 500);
    assert_eq!(view.json_field("error"), Some(json!("boom")));
}

#[tokio::test]
async fn test_post_sends_json_body_and_headers() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/validate")
        .match_header("content-type", "application/json")
        .match_header("x-request-id", Matcher::Regex("^[0-9a-f-]{36}$".to_string()))
        .match_body(Matcher::Json(json!({"transactionId": "t-1", "amount": 250})))
        .with_status(200)
        .with_body(r#"{"transactionId":"t-1"}"#)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let spec = RequestSpec::post_json(
        "/api/v1/validate",
        json!({"transactionId": "t-1", "amount": 250}),
    );
    let view = client.execute(&spec).await.unwrap();

    assert_eq!(view.status, 200);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_each_request_gets_a_fresh_request_id() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/ready")
        .match_header("x-request-id", Matcher::Any)
        .with_status(200)
        .expect(2)
        .create_async()
        .await;

    let client = client_for(&server.url());
    client.execute(&RequestSpec::get("/ready")).await.unwrap();
    client.execute(&RequestSpec::get("/ready")).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Bind and release a port so nothing is listening on it.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = client_for(&format!("http://127.0.0.1:{port}"));

    let err = client.execute(&RequestSpec::get("/health")).await.unwrap_err();
    assert!(matches!(err, SurgeError::NetworkError(_)), "got {err:?}");
    assert!(err.is_transport());
}
