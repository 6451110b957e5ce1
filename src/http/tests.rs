//! Tests for the HTTP client module

use super::*;
use reqwest::Method;
use crate::error::Error;
use crate::types::BackoffType;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_client(server: &MockServer, max_retries: u32) -> HttpClient {
    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .max_retries(max_retries)
        .backoff(
            BackoffType::Constant,
            Duration::from_millis(10),
            Duration::from_secs(1),
        )
        .rate_limit_cooldown(Duration::from_millis(10))
        .no_rate_limit()
        .build();
    HttpClient::with_config(config).unwrap()
}

#[test]
fn test_http_client_config_default() {
    let config = HttpClientConfig::default();
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.backoff_type, BackoffType::Exponential);
    assert_eq!(config.rate_limit_cooldown, Duration::from_secs(30));
    assert!(config.base_url.is_none());
    assert_eq!(config.rate_limit, Some(RateLimiterConfig::default()));
}

#[test]
fn test_http_client_config_builder() {
    let config = HttpClientConfig::builder()
        .base_url("https://api.airtable.com")
        .timeout(Duration::from_secs(60))
        .max_retries(2)
        .backoff(
            BackoffType::Linear,
            Duration::from_millis(200),
            Duration::from_secs(30),
        )
        .bearer_token("pat123")
        .header("X-Custom", "value")
        .user_agent("test-agent/1.0")
        .build();

    assert_eq!(config.base_url.as_deref(), Some("https://api.airtable.com"));
    assert_eq!(config.timeout, Duration::from_secs(60));
    assert_eq!(config.max_retries, 2);
    assert_eq!(config.backoff_type, BackoffType::Linear);
    assert_eq!(config.initial_backoff, Duration::from_millis(200));
    assert_eq!(config.bearer_token.as_deref(), Some("pat123"));
    assert_eq!(
        config.default_headers.get("X-Custom"),
        Some(&"value".to_string())
    );
    assert_eq!(config.user_agent, "test-agent/1.0");
}

#[test]
fn test_config_debug_hides_token() {
    let config = HttpClientConfig::builder().bearer_token("secret-pat").build();
    let debug_str = format!("{config:?}");
    assert!(!debug_str.contains("secret-pat"));
    assert!(debug_str.contains("has_bearer_token: true"));
}

#[test]
fn test_request_config_builder_keeps_repeated_keys() {
    let config = RequestConfig::new()
        .query("records[]", "rec1")
        .query("records[]", "rec2")
        .header("X-Request-Id", "abc123")
        .json(serde_json::json!({"key": "value"}))
        .timeout(Duration::from_secs(10))
        .retries(2);

    assert_eq!(
        config.query,
        vec![
            ("records[]".to_string(), "rec1".to_string()),
            ("records[]".to_string(), "rec2".to_string()),
        ]
    );
    assert!(config.body.is_some());
    assert_eq!(config.timeout, Some(Duration::from_secs(10)));
    assert_eq!(config.max_retries, Some(2));
    assert!(config.cancel.is_none());
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v0/meta/bases/app1/tables"))
        .and(header("Authorization", "Bearer pat-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"tables": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url(mock_server.uri())
        .bearer_token("pat-abc")
        .no_rate_limit()
        .build();
    let client = HttpClient::with_config(config).unwrap();

    let body: serde_json::Value = client
        .request_json(Method::GET, "/v0/meta/bases/app1/tables", RequestConfig::new())
        .await
        .unwrap();
    assert_eq!(body["tables"], serde_json::json!([]));
}

#[tokio::test]
async fn test_query_params_are_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v0/app1/People"))
        .and(query_param("offset", "itr1"))
        .and(query_param("pageSize", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"records": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server, 0);
    let response = client
        .request(
            Method::GET,
            "/v0/app1/People",
            RequestConfig::new()
                .query("offset", "itr1")
                .query("pageSize", "100"),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v0/app1/People"))
        .respond_with(
            ResponseTemplate::new(422).set_body_string(r#"{"error":{"type":"INVALID_VALUE_FOR_COLUMN"}}"#),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server, 3);
    let err = client
        .request(
            Method::POST,
            "/v0/app1/People",
            RequestConfig::new().json(serde_json::json!({"records": []})),
        )
        .await
        .unwrap_err();

    match err {
        Error::HttpStatus { status, body } => {
            assert_eq!(status, 422);
            assert!(body.contains("INVALID_VALUE_FOR_COLUMN"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_retry_on_500_then_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server, 3);
    let response = client
        .request(Method::GET, "/api/flaky", RequestConfig::new())
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_rate_limit_without_retry_after_uses_cooldown() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/limited"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/limited"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server, 2);
    let response = client
        .request(Method::GET, "/api/limited", RequestConfig::new())
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_rate_limit_exhausted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server, 1);
    let err = client
        .request(Method::GET, "/api/limited", RequestConfig::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RateLimited { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_max_retries_exceeded_surfaces_last_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/always-fail"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server, 2);
    let err = client
        .request(Method::GET, "/api/always-fail", RequestConfig::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::HttpStatus { status: 503, .. }));
}

#[tokio::test]
async fn test_cancellation_stops_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/always-fail"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url(mock_server.uri())
        .max_retries(5)
        .backoff(
            BackoffType::Constant,
            Duration::from_secs(30),
            Duration::from_secs(30),
        )
        .no_rate_limit()
        .build();
    let client = HttpClient::with_config(config).unwrap();

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = client
        .request(
            Method::GET,
            "/api/always-fail",
            RequestConfig::new().cancel_on(token),
        )
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(err, Error::HttpStatus { status: 500, .. }));
}

#[tokio::test]
async fn test_cancelled_before_first_attempt_sends_nothing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/records"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server, 3);
    let token = CancellationToken::new();
    token.cancel();

    let err = client
        .request(
            Method::POST,
            "/api/records",
            RequestConfig::new().cancel_on(token),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn test_undecodable_json_is_unexpected_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server, 0);
    let err = client
        .request_json::<serde_json::Value>(Method::GET, "/api/html", RequestConfig::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnexpectedResponse { .. }));
}

#[tokio::test]
async fn test_full_url_bypasses_base() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/test"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url("https://unused.example.com")
        .no_rate_limit()
        .build();
    let client = HttpClient::with_config(config).unwrap();

    let response = client
        .request(
            Method::GET,
            &format!("{}/api/test", mock_server.uri()),
            RequestConfig::new(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[test]
fn test_calculate_backoff_linear() {
    let config = HttpClientConfig::builder()
        .backoff(
            BackoffType::Linear,
            Duration::from_millis(100),
            Duration::from_secs(10),
        )
        .no_rate_limit()
        .build();
    let client = HttpClient::with_config(config).unwrap();

    assert_eq!(client.calculate_backoff(0), Duration::from_millis(100));
    assert_eq!(client.calculate_backoff(1), Duration::from_millis(200));
    assert_eq!(client.calculate_backoff(2), Duration::from_millis(300));
}

#[test]
fn test_calculate_backoff_exponential_is_capped() {
    let config = HttpClientConfig::builder()
        .backoff(
            BackoffType::Exponential,
            Duration::from_millis(100),
            Duration::from_millis(500),
        )
        .no_rate_limit()
        .build();
    let client = HttpClient::with_config(config).unwrap();

    assert_eq!(client.calculate_backoff(0), Duration::from_millis(100));
    assert_eq!(client.calculate_backoff(1), Duration::from_millis(200));
    assert_eq!(client.calculate_backoff(2), Duration::from_millis(400));
    assert_eq!(client.calculate_backoff(3), Duration::from_millis(500));
    assert_eq!(client.calculate_backoff(40), Duration::from_millis(500));
}

#[tokio::test]
async fn test_rate_limiter_paces_requests() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/data"))
        .respond_with(ResponseTemplate::new(200))
        .expect(4)
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url(mock_server.uri())
        .rate_limit(RateLimiterConfig::new(10, 2))
        .build();
    let client = HttpClient::with_config(config).unwrap();

    let started = Instant::now();
    for _ in 0..4 {
        client
            .request(Method::GET, "/api/data", RequestConfig::new())
            .await
            .unwrap();
    }

    // Two requests fit the burst; the remaining two wait ~100ms each
    assert!(started.elapsed() >= Duration::from_millis(150));
}
