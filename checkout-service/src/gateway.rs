use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Fallback when a gateway error body carries no readable message.
pub const GATEWAY_UNREACHABLE_MESSAGE: &str = "Failed to reach the payment gateway API";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapTransactionRequest {
    pub transaction_details: TransactionDetails,
    pub customer_details: CustomerDetails,
    pub item_details: Vec<ItemDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_payments: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callbacks: Option<Callbacks>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub order_id: String,
    pub gross_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub first_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetail {
    pub id: String,
    pub price: i64,
    pub quantity: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Callbacks {
    pub finish: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapSession {
    pub token: String,
    pub redirect_url: String,
}

/// Authoritative transaction state returned by the gateway's status API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub order_id: String,
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub status_code: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub gross_amount: Option<String>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway answered with an error status and (usually) a JSON body.
    #[error("gateway responded with status {status}: {message}")]
    Api {
        status: u16,
        message: String,
        body: Option<Value>,
    },
    #[error("gateway request failed: {0}")]
    Transport(String),
    #[error("unexpected gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Builds an `Api` error, reading `status_message` or the first `error_messages` entry.
    pub fn api(status: u16, body: Option<Value>) -> Self {
        let message = body
            .as_ref()
            .and_then(|b| {
                b.get("status_message")
                    .and_then(Value::as_str)
                    .or_else(|| {
                        b.get("error_messages")
                            .and_then(Value::as_array)
                            .and_then(|msgs| msgs.first())
                            .and_then(Value::as_str)
                    })
            })
            .map(str::to_string)
            .unwrap_or_else(|| GATEWAY_UNREACHABLE_MESSAGE.to_string());
        GatewayError::Api { status, message, body }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            GatewayError::Api { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayError::Api { .. } => "rejected",
            GatewayError::Transport(_) => "transport_error",
            GatewayError::Decode(_) => "decode_error",
        }
    }
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_transaction(&self, request: &SnapTransactionRequest) -> Result<SnapSession, GatewayError>;
    async fn transaction_status(&self, transaction_id: &str) -> Result<TransactionStatus, GatewayError>;
}
