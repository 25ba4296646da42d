//! Telemetry client tests against a mock upstream service.

use chrono::NaiveDate;
use serde_json::json;
use wiremock::matchers::{bearer_token, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use damwatch_telemetry::{RetryPolicy, TelemetryClient, TelemetryCredentials, TelemetryError};

fn test_credentials() -> TelemetryCredentials {
    TelemetryCredentials {
        username: "collector".to_string(),
        password: "secret".to_string(),
    }
}

fn client_for(server: &MockServer) -> TelemetryClient {
    TelemetryClient::new(server.uri(), test_credentials())
        .expect("client construction")
        // No backoff sleeps in tests.
        .with_retry_policy(RetryPolicy::new(2, 0))
}

#[tokio::test]
async fn authenticate_returns_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token"))
        .and(body_partial_json(json!({"username": "collector"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = client_for(&server).authenticate().await.unwrap();
    assert_eq!(token.as_str(), "tok-123");
}

#[tokio::test]
async fn authenticate_rejection_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server).authenticate().await.unwrap_err();
    assert!(matches!(err, TelemetryError::AuthFailed(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn authenticate_retries_transient_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-after-retry"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = client_for(&server).authenticate().await.unwrap();
    assert_eq!(token.as_str(), "tok-after-retry");
}

#[tokio::test]
async fn fetch_window_parses_items_and_passes_dates() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-123"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/stations/STN-042/measurements"))
        .and(bearer_token("tok-123"))
        .and(query_param("start_date", "2024-01-01"))
        .and(query_param("end_date", "2024-01-30"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "stationCode": "STN-042",
                "measuredAt": "2024-01-01T07:00:00Z",
                "value": "1500.00"
            },
            {
                "stationCode": "STN-042",
                "measuredAt": "2024-01-02T07:00:00Z",
                "value": null
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let token = client.authenticate().await.unwrap();
    let items = client
        .fetch_window(
            "STN-042",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            &token,
        )
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].station_code, "STN-042");
    assert_eq!(items[0].value.as_deref(), Some("1500.00"));
    assert!(items[1].value.is_none());
}

#[tokio::test]
async fn fetch_window_empty_body_is_not_an_error() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-123"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/stations/STN-042/measurements"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let token = client.authenticate().await.unwrap();
    let items = client
        .fetch_window(
            "STN-042",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            &token,
        )
        .await
        .unwrap();

    assert!(items.is_empty());
}

#[tokio::test]
async fn fetch_window_persistent_server_error_surfaces() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-123"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/stations/STN-042/measurements"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        // Initial attempt plus two retries.
        .expect(3)
        .mount(&server)
        .await;

    let token = client.authenticate().await.unwrap();
    let err = client
        .fetch_window(
            "STN-042",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            &token,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TelemetryError::UnexpectedStatus { status: 500, .. }
    ));
    assert!(err.is_transient());
}
