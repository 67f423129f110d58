//! HTTP-level tests for `HttpBackend` and the executor on top of it.
//!
//! A wiremock server stands in for the business backend so the full
//! reqwest request/response path is exercised.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nova_core::executor::{FunctionCallRequest, FunctionCallResult, FunctionExecutor};
use nova_core::{BackendCallError, BackendClient, BackendRequest, FunctionCatalog, HttpBackend, Mode};

fn backend(server: &MockServer, timeout: Duration) -> HttpBackend {
    HttpBackend::new(&server.uri(), timeout).unwrap()
}

fn executor(server: &MockServer, mode: Mode, timeout: Duration) -> FunctionExecutor {
    let catalog = FunctionCatalog::builtin().unwrap();
    FunctionExecutor::new(
        catalog.get_functions(mode).unwrap(),
        Arc::new(backend(server, timeout)),
    )
}

#[tokio::test]
async fn search_products_posts_query_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/products/search"))
        .and(body_json(json!({ "query": "red shoes" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "name": "Red sneaker" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let exec = executor(&server, Mode::Orders, Duration::from_secs(5));
    let result = exec
        .dispatch(&FunctionCallRequest::new(
            "call_1",
            "searchProducts",
            json!({ "query": "red shoes" }),
        ))
        .await;

    assert_eq!(
        result,
        FunctionCallResult::Success {
            payload: json!([{ "id": 1, "name": "Red sneaker" }])
        }
    );
}

#[tokio::test]
async fn slow_backend_yields_timeout_and_executor_keeps_working() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/products/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(2)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/search/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 42 })))
        .mount(&server)
        .await;

    let exec = executor(&server, Mode::Orders, Duration::from_millis(200));

    let first = exec
        .dispatch(&FunctionCallRequest::new(
            "call_1",
            "searchProducts",
            json!({ "query": "red shoes" }),
        ))
        .await;
    match first {
        FunctionCallResult::Failure { cause, .. } => assert_eq!(cause.as_deref(), Some("timeout")),
        other => panic!("Expected timeout failure, got {other:?}"),
    }

    let next = exec
        .dispatch(&FunctionCallRequest::new(
            "call_2",
            "checkClientId",
            json!({ "clientId": "42" }),
        ))
        .await;
    assert!(next.is_success());
}

#[tokio::test]
async fn create_order_sends_idempotency_key_and_numeric_client() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header("Idempotency-Key", "call_77"))
        .and(body_json(json!({
            "clientId": 1042,
            "products": [{ "productId": "P-7", "quantity": 2 }]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "orderId": 9 })))
        .expect(1)
        .mount(&server)
        .await;

    let exec = executor(&server, Mode::Orders, Duration::from_secs(5));
    let result = exec
        .dispatch(&FunctionCallRequest::new(
            "call_77",
            "createOrder",
            json!({ "clientId": "1042", "products": [{ "productId": "P-7", "quantity": 2 }] }),
        ))
        .await;

    assert!(result.is_success());
}

#[tokio::test]
async fn error_status_is_reported_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bookings/XK42PQ/check-in"))
        .and(header_exists("Idempotency-Key"))
        .respond_with(ResponseTemplate::new(409).set_body_string("already checked in"))
        .expect(1)
        .mount(&server)
        .await;

    let exec = executor(&server, Mode::Airline, Duration::from_secs(5));
    let result = exec
        .dispatch(&FunctionCallRequest::new(
            "call_3",
            "checkInPassenger",
            json!({ "bookingCode": "XK42PQ" }),
        ))
        .await;

    match result {
        FunctionCallResult::Failure {
            cause,
            reason,
            retryable,
            ..
        } => {
            assert_eq!(cause.as_deref(), Some("status"));
            assert!(reason.contains("409"));
            assert!(reason.contains("already checked in"));
            assert!(!retryable);
        }
        other => panic!("Expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_arguments_never_reach_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let exec = executor(&server, Mode::Airline, Duration::from_secs(5));
    let result = exec
        .dispatch(&FunctionCallRequest::new(
            "call_4",
            "checkInPassenger",
            json!({ "seatPreference": "window" }),
        ))
        .await;

    match result {
        FunctionCallResult::Failure { kind, .. } => assert_eq!(kind, "invalid_arguments"),
        other => panic!("Expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_success_body_is_null_and_bad_json_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/leads"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders/client/5"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = backend(&server, Duration::from_secs(5));

    let empty = client
        .send(BackendRequest::post(["leads"], json!({ "call_outcome": "callback" })))
        .await
        .unwrap();
    assert!(empty.is_null());

    let err = client
        .send(BackendRequest::get(["orders", "client", "5"]))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendCallError::Decode(_)));
}

#[tokio::test]
async fn unreachable_backend_is_a_connection_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = HttpBackend::new(&uri, Duration::from_secs(2)).unwrap();
    let err = client
        .send(BackendRequest::get(["users", "search", "1"]))
        .await
        .unwrap_err();

    assert_eq!(err.cause(), "connection");
    assert!(err.is_retryable(true));
}
