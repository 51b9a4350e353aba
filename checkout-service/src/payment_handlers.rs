use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header::CONTENT_TYPE, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use common_http_errors::{ApiError, ApiResult};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::{CheckoutError, CheckoutResult};
use crate::order::OrderRequest;
use crate::webhook::PaymentNotification;

pub async fn health() -> &'static str {
    "ok"
}

pub async fn service_info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "Checkout payment gateway API",
        "status": "running",
        "timestamp": Utc::now().to_rfc3339(),
        "mode": state.config.midtrans.mode.as_str(),
        "endpoints": {
            "test": "GET /test",
            "testGateway": "GET /test-midtrans",
            "createTransaction": "POST /create-transaction",
            "notification": "POST /midtrans-notification",
            "paymentStatus": "GET /orders/{order_id}/payment-status",
        },
    }))
}

pub async fn service_test(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Checkout backend is running",
        "timestamp": Utc::now().to_rfc3339(),
        "port": state.config.port,
        "mode": state.config.midtrans.mode.as_str(),
        "configured": state.config.midtrans.is_configured(),
    }))
}

pub async fn gateway_test(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    match state.initiator.probe().await {
        Ok(result) => {
            info!(test_order_id = %result.test_order_id, "Gateway connectivity probe succeeded");
            Ok(Json(json!({
                "success": true,
                "message": "Connected to the payment gateway",
                "test_order_id": result.test_order_id,
                "token_received": !result.session.token.is_empty(),
                "mode": state.config.midtrans.mode.as_str(),
            })))
        }
        Err(err) => {
            warn!(error = %err, "Gateway connectivity probe failed");
            Err(ApiError::Internal {
                code: "gateway_probe_failed",
                trace_id: None,
                message: "Failed to connect to the payment gateway".into(),
                details: Some(err.body().cloned().unwrap_or(Value::Null)),
                error: Some(err.to_string()),
            })
        }
    }
}

pub async fn create_transaction(
    State(state): State<AppState>,
    payload: Result<Json<OrderRequest>, JsonRejection>,
) -> CheckoutResult<Json<Value>> {
    let Json(request) = payload.map_err(|rejection| CheckoutError::invalid(rejection.body_text()))?;
    let payment = state.initiator.initiate(request).await?;
    info!(transaction_id = %payment.order_id, "Payment session created");
    Ok(Json(json!({ "success": true, "data": payment })))
}

pub async fn midtrans_notification(
    State(state): State<AppState>,
    payload: Result<Json<PaymentNotification>, JsonRejection>,
) -> CheckoutResult<Json<Value>> {
    let Json(notification) =
        payload.map_err(|rejection| CheckoutError::VerificationFailed(rejection.body_text()))?;
    let reconciled = state.reconciler.reconcile(notification).await?;
    info!(
        transaction_id = %reconciled.transaction_id,
        payment_status = %reconciled.payment_status,
        "Notification processed"
    );
    Ok(Json(json!({ "success": true, "message": "Notification processed successfully" })))
}

pub async fn payment_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = state
        .store
        .get(&order_id)
        .await
        .map_err(|err| ApiError::from(CheckoutError::internal(err)))?;
    match record {
        Some(record) => Ok(Json(json!({ "success": true, "data": record }))),
        None => Err(ApiError::not_found(
            "payment_status_not_found",
            format!("No payment status recorded for {order_id}"),
        )),
    }
}

pub async fn metrics(State(state): State<AppState>) -> ApiResult<Response> {
    let body = state
        .metrics
        .render()
        .map_err(|err| ApiError::from(CheckoutError::internal(err)))?;
    let mut resp = body.into_response();
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));
    Ok(resp)
}

pub async fn route_not_found() -> ApiError {
    ApiError::not_found("not_found", "Route not found")
}
