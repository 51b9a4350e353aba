use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, Request,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use common_http_errors::ApiError;
use common_observability::CheckoutMetrics;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info};

use crate::config::CheckoutConfig;
use crate::gateway::PaymentGateway;
use crate::initiator::TransactionInitiator;
use crate::payment_handlers::{
    create_transaction, gateway_test, health, metrics, midtrans_notification, payment_status, route_not_found,
    service_info, service_test,
};
use crate::reconciler::NotificationReconciler;
use crate::store::PaymentStatusStore;

const SERVICE_NAME: &str = "checkout-service";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CheckoutConfig>,
    pub initiator: Arc<TransactionInitiator>,
    pub reconciler: Arc<NotificationReconciler>,
    pub store: Arc<dyn PaymentStatusStore>,
    pub metrics: Arc<CheckoutMetrics>,
}

impl AppState {
    pub fn new(
        config: CheckoutConfig,
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn PaymentStatusStore>,
        metrics: Arc<CheckoutMetrics>,
    ) -> Self {
        let config = Arc::new(config);
        let initiator = TransactionInitiator::new(gateway.clone(), config.clone());
        let reconciler =
            NotificationReconciler::new(gateway, store.clone(), &config.midtrans).with_metrics(metrics.clone());
        Self {
            config,
            initiator: Arc::new(initiator),
            reconciler: Arc::new(reconciler),
            store,
            metrics,
        }
    }
}

pub async fn http_error_metrics(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get("X-Error-Code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        state.metrics.record_http_error(SERVICE_NAME, code, status.as_u16());
    }
    resp
}

pub async fn log_requests(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    info!(%method, %path, "Request received");
    let resp = next.run(req).await;
    info!(
        %method,
        %path,
        status = resp.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request completed"
    );
    resp
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "Handler panicked");
    ApiError::internal("Internal server error", None).into_response()
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);
    Router::new()
        .route("/", get(service_info))
        .route("/test", get(service_test))
        .route("/test-midtrans", get(gateway_test))
        .route("/create-transaction", post(create_transaction))
        .route("/midtrans-notification", post(midtrans_notification))
        .route("/orders/:order_id/payment-status", get(payment_status))
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .fallback(route_not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(state.clone(), http_error_metrics))
        .layer(middleware::from_fn(log_requests))
        .layer(cors)
        .with_state(state)
}
