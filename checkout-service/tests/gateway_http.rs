use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use checkout_service::{
    build_router, AppState, CheckoutConfig, GatewayError, GatewayMode, InMemoryPaymentStatusStore, MidtransClient,
    MidtransConfig, PaymentGateway, PaymentStatus, PaymentStatusStore,
};
use common_observability::CheckoutMetrics;
use httpmock::prelude::*;
use serde_json::{json, Value};
use tower::util::ServiceExt;

const SERVER_KEY: &str = "SB-Mid-server-it";
// base64("SB-Mid-server-it:")
const BASIC_AUTH: &str = "Basic U0ItTWlkLXNlcnZlci1pdDo=";

fn midtrans_config(server: &MockServer) -> MidtransConfig {
    let mut config = MidtransConfig::new(GatewayMode::Sandbox, SERVER_KEY, "SB-Mid-client-it")
        .with_base_urls(server.url("/snap/v1"), server.base_url());
    config.timeout_secs = 5;
    config.verify_signature = false;
    config
}

fn app_for(server: &MockServer, store: Arc<InMemoryPaymentStatusStore>) -> axum::Router {
    let config = midtrans_config(server);
    let metrics = Arc::new(CheckoutMetrics::new().unwrap());
    let client = MidtransClient::new(config.clone()).unwrap().with_metrics(metrics.clone());
    let state = AppState::new(CheckoutConfig::with_gateway(config), Arc::new(client), store, metrics);
    build_router(state)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), 1024 * 64).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn order() -> Value {
    json!({
        "orderId": "ORD1",
        "amount": 50000,
        "customerName": "Budi",
        "orderItems": [{"name": "Mie Ayam", "price": 25000, "quantity": 2}],
        "paymentMethod": "gopay"
    })
}

#[tokio::test]
async fn create_transaction_posts_snap_payload() {
    let server = MockServer::start_async().await;
    let snap = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/snap/v1/transactions")
                .header("authorization", BASIC_AUTH)
                .body_contains("\"id\":\"mie-ayam\"")
                .body_contains("\"enabled_payments\":[\"gopay\"]")
                .body_contains("\"gross_amount\":50000");
            then.status(201).json_body(json!({
                "token": "66e4fa55-fdac-4ef9-91b5-733b97d1b862",
                "redirect_url": "https://app.sandbox.midtrans.com/snap/v4/redirection/66e4fa55"
            }));
        })
        .await;

    let app = app_for(&server, Arc::new(InMemoryPaymentStatusStore::new()));
    let resp = app.oneshot(post_json("/create-transaction", order())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert_eq!(v["data"]["token"], "66e4fa55-fdac-4ef9-91b5-733b97d1b862");
    assert!(v["data"]["order_id"].as_str().unwrap().starts_with("ORD1-"));
    snap.assert_hits_async(1).await;
}

#[tokio::test]
async fn gateway_rejection_is_relayed_with_its_status() {
    let server = MockServer::start_async().await;
    let snap = server
        .mock_async(|when, then| {
            when.method(POST).path("/snap/v1/transactions");
            then.status(400).json_body(json!({"error_messages": ["Invalid amount"]}));
        })
        .await;

    let app = app_for(&server, Arc::new(InMemoryPaymentStatusStore::new()));
    let resp = app.oneshot(post_json("/create-transaction", order())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "gateway_rejected");
    let v = body_json(resp).await;
    assert_eq!(v["message"], "Invalid amount");
    assert_eq!(v["details"]["error_messages"][0], "Invalid amount");
    snap.assert_hits_async(1).await;
}

#[tokio::test]
async fn invalid_order_never_reaches_gateway() {
    let server = MockServer::start_async().await;
    let snap = server
        .mock_async(|when, then| {
            when.method(POST).path("/snap/v1/transactions");
            then.status(201).json_body(json!({"token": "t", "redirect_url": "u"}));
        })
        .await;

    let app = app_for(&server, Arc::new(InMemoryPaymentStatusStore::new()));
    let mut body = order();
    body["amount"] = json!(-1);
    let resp = app.oneshot(post_json("/create-transaction", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    snap.assert_hits_async(0).await;
}

#[tokio::test]
async fn notification_is_verified_against_status_api() {
    let server = MockServer::start_async().await;
    let status = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v2/ORD1-1700000000000/status")
                .header("authorization", BASIC_AUTH);
            then.status(200).json_body(json!({
                "status_code": "200",
                "order_id": "ORD1-1700000000000",
                "transaction_status": "capture",
                "fraud_status": "accept",
                "payment_type": "credit_card",
                "gross_amount": "50000.00"
            }));
        })
        .await;

    let store = Arc::new(InMemoryPaymentStatusStore::new());
    let app = app_for(&server, store.clone());
    let notification = json!({
        "order_id": "ORD1-1700000000000",
        "transaction_status": "settlement",
        "status_code": "200",
        "gross_amount": "50000.00"
    });
    let resp = app.oneshot(post_json("/midtrans-notification", notification)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    status.assert_hits_async(1).await;

    let stored = store.get("ORD1-1700000000000").await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.payment_type.as_deref(), Some("credit_card"));
}

#[tokio::test]
async fn status_body_error_code_is_a_rejection() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v2/unknown-1/status");
            then.status(200).json_body(json!({
                "status_code": "404",
                "status_message": "Transaction doesn't exist.",
                "id": "e48e5a35"
            }));
        })
        .await;

    let client = MidtransClient::new(midtrans_config(&server)).unwrap();
    let err = client.transaction_status("unknown-1").await.unwrap_err();
    assert!(
        matches!(err, GatewayError::Api { status: 404, ref message, .. } if message == "Transaction doesn't exist."),
        "{err:?}"
    );
}

#[tokio::test]
async fn expired_status_code_is_still_an_answer() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v2/ORD2-1/status");
            then.status(200).json_body(json!({
                "status_code": "407",
                "status_message": "Success, transaction is expired",
                "order_id": "ORD2-1",
                "transaction_status": "expire"
            }));
        })
        .await;

    let client = MidtransClient::new(midtrans_config(&server)).unwrap();
    let status = client.transaction_status("ORD2-1").await.unwrap();
    assert_eq!(status.transaction_status, "expire");
    assert_eq!(
        PaymentStatus::from_gateway(&status.transaction_status, status.fraud_status.as_deref()),
        PaymentStatus::Failed
    );
}

#[tokio::test]
async fn undecodable_snap_response_is_a_decode_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/snap/v1/transactions");
            then.status(201).body("<html>maintenance</html>");
        })
        .await;

    let app = app_for(&server, Arc::new(InMemoryPaymentStatusStore::new()));
    let resp = app.oneshot(post_json("/create-transaction", order())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "internal_error");
    let v = body_json(resp).await;
    assert!(v["trace_id"].is_string());
    assert!(!v["message"].as_str().unwrap().contains("maintenance"));
}

#[tokio::test]
async fn html_error_page_is_internal_not_a_rejection() {
    let server = MockServer::start_async().await;
    let snap = server
        .mock_async(|when, then| {
            when.method(POST).path("/snap/v1/transactions");
            then.status(502).body("<html>Bad Gateway</html>");
        })
        .await;

    let app = app_for(&server, Arc::new(InMemoryPaymentStatusStore::new()));
    let resp = app.oneshot(post_json("/create-transaction", order())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "internal_error");
    let v = body_json(resp).await;
    assert!(v["trace_id"].is_string());
    assert!(v.get("details").is_none());
    snap.assert_hits_async(1).await;
}

#[tokio::test]
async fn unreadable_status_answer_hides_detail_from_notifier() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v2/ORD3-1/status");
            then.status(502).body("<html>Bad Gateway</html>");
        })
        .await;

    let store = Arc::new(InMemoryPaymentStatusStore::new());
    let app = app_for(&server, store.clone());
    let resp = app
        .oneshot(post_json("/midtrans-notification", json!({"order_id": "ORD3-1"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "verification_failed");
    let v = body_json(resp).await;
    assert_eq!(v["message"], "Notification could not be verified");
    assert!(store.get("ORD3-1").await.unwrap().is_none());
}
