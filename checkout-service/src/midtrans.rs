use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::header::ACCEPT;
use common_observability::CheckoutMetrics;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::MidtransConfig;
use crate::gateway::{GatewayError, PaymentGateway, SnapSession, SnapTransactionRequest, TransactionStatus};

/// Status code the gateway uses for expired transactions; still a valid status answer.
const EXPIRED_STATUS_CODE: u16 = 407;

/// HTTP client for the Snap (transaction creation) and Core (status lookup) APIs.
pub struct MidtransClient {
    http: Client,
    config: MidtransConfig,
    metrics: Option<Arc<CheckoutMetrics>>,
}

impl MidtransClient {
    pub fn new(config: MidtransConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build gateway HTTP client")?;
        Ok(Self { http, config, metrics: None })
    }

    pub fn with_metrics(mut self, metrics: Arc<CheckoutMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record(&self, operation: &str, outcome: &str, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.record_gateway_call(operation, outcome);
            metrics.gateway_timer(operation).observe(elapsed.as_secs_f64());
        }
    }

    fn status_url(&self, transaction_id: &str) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.config.api_base_url)
            .map_err(|err| GatewayError::Transport(format!("invalid status API base url: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Transport("status API base url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["v2", transaction_id, "status"]);
        Ok(url)
    }
}

/// Error statuses with a JSON body become `GatewayError::Api`; without one they are `Decode`.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let status = response.status().as_u16();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| GatewayError::Transport(err.to_string()))?;
    if !(200..300).contains(&status) {
        return match serde_json::from_slice::<Value>(&bytes) {
            Ok(body) => Err(GatewayError::api(status, Some(body))),
            Err(err) => Err(GatewayError::Decode(format!("status {status} with non-JSON body: {err}"))),
        };
    }
    serde_json::from_slice::<T>(&bytes).map_err(|err| GatewayError::Decode(err.to_string()))
}

#[async_trait::async_trait]
impl PaymentGateway for MidtransClient {
    async fn create_transaction(&self, request: &SnapTransactionRequest) -> Result<SnapSession, GatewayError> {
        let url = format!("{}/transactions", self.config.snap_base_url);
        let order_id = &request.transaction_details.order_id;
        info!(
            order_id = %order_id,
            gross_amount = request.transaction_details.gross_amount,
            items = request.item_details.len(),
            mode = self.config.mode.as_str(),
            "Issuing gateway transaction request"
        );
        let started = std::time::Instant::now();
        let result: Result<SnapSession, GatewayError> = async {
            let response = self
                .http
                .post(&url)
                .basic_auth(&self.config.server_key, None::<&str>)
                .header(ACCEPT, "application/json")
                .json(request)
                .send()
                .await
                .map_err(|err| GatewayError::Transport(err.to_string()))?;
            read_json::<SnapSession>(response).await
        }
        .await;

        match &result {
            Ok(_) => {
                self.record("create_transaction", "ok", started.elapsed());
                info!(order_id = %order_id, elapsed_ms = started.elapsed().as_millis() as u64, "Gateway transaction created");
            }
            Err(err) => {
                self.record("create_transaction", err.outcome(), started.elapsed());
                warn!(order_id = %order_id, error = %err, "Gateway transaction request failed");
            }
        }
        result
    }

    async fn transaction_status(&self, transaction_id: &str) -> Result<TransactionStatus, GatewayError> {
        info!(transaction_id, "Issuing gateway status lookup");
        let started = std::time::Instant::now();
        let result: Result<TransactionStatus, GatewayError> = async {
            let url = self.status_url(transaction_id)?;
            let response = self
                .http
                .get(url)
                .basic_auth(&self.config.server_key, None::<&str>)
                .header(ACCEPT, "application/json")
                .send()
                .await
                .map_err(|err| GatewayError::Transport(err.to_string()))?;
            let body = read_json::<Value>(response).await?;
            // The Core API reports lookup failures in the body with an HTTP 200.
            let body_status = body
                .get("status_code")
                .and_then(|v| match v {
                    Value::String(s) => s.parse::<u16>().ok(),
                    Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
                    _ => None,
                });
            if let Some(code) = body_status {
                if code >= 400 && code != EXPIRED_STATUS_CODE {
                    return Err(GatewayError::api(code, Some(body)));
                }
            }
            serde_json::from_value::<TransactionStatus>(body).map_err(|err| GatewayError::Decode(err.to_string()))
        }
        .await;

        match &result {
            Ok(status) => {
                self.record("transaction_status", "ok", started.elapsed());
                info!(
                    transaction_id,
                    order_id = %status.order_id,
                    transaction_status = %status.transaction_status,
                    fraud_status = status.fraud_status.as_deref().unwrap_or("-"),
                    "Gateway status lookup completed"
                );
            }
            Err(err) => {
                self.record("transaction_status", err.outcome(), started.elapsed());
                warn!(transaction_id, error = %err, "Gateway status lookup failed");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayMode;

    #[test]
    fn status_url_escapes_identifier() {
        let config = MidtransConfig::new(GatewayMode::Sandbox, "k", "c")
            .with_base_urls("http://localhost/snap/v1", "http://localhost:9000/");
        let client = MidtransClient::new(config).unwrap();
        let url = client.status_url("ORD 1/2-1700000000000").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/v2/ORD%201%2F2-1700000000000/status");
    }

    #[test]
    fn status_url_keeps_base_path() {
        let config = MidtransConfig::new(GatewayMode::Sandbox, "k", "c")
            .with_base_urls("http://localhost/snap/v1", "http://localhost:9000/core");
        let client = MidtransClient::new(config).unwrap();
        let url = client.status_url("abc").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/core/v2/abc/status");
    }
}
