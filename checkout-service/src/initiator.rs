use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, CheckoutResult};
use crate::gateway::{
    Callbacks, CustomerDetails, GatewayError, ItemDetail, PaymentGateway, SnapSession, SnapTransactionRequest,
    TransactionDetails,
};
use crate::order::{item_slug, OrderItem, OrderRequest, TransactionIdClock, ValidatedOrder};

/// Fields the storefront needs to open the hosted payment page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitiatedPayment {
    pub token: String,
    pub redirect_url: String,
    /// The gateway transaction identifier, not the client's order id.
    pub order_id: String,
}

/// Result of the connectivity probe behind `GET /test-midtrans`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub test_order_id: String,
    pub session: SnapSession,
}

pub struct TransactionInitiator {
    gateway: Arc<dyn PaymentGateway>,
    config: Arc<CheckoutConfig>,
    clock: TransactionIdClock,
}

impl TransactionInitiator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, config: Arc<CheckoutConfig>) -> Self {
        Self {
            gateway,
            config,
            clock: TransactionIdClock::new(),
        }
    }

    pub async fn initiate(&self, request: OrderRequest) -> CheckoutResult<InitiatedPayment> {
        let order = request.validate()?;
        if !self.config.midtrans.is_configured() {
            warn!(order_id = %order.order_id, "Rejecting order: gateway credentials are placeholders");
            return Err(CheckoutError::MisconfiguredGateway);
        }

        let transaction_id = self.clock.transaction_id(&order.order_id);
        info!(
            client_order_id = %order.order_id,
            transaction_id = %transaction_id,
            amount = order.amount,
            payment_method = order.payment_method.as_deref().unwrap_or("any"),
            "Initiating payment"
        );
        let payload = self.build_payload(&order, transaction_id.clone());
        let session = self.gateway.create_transaction(&payload).await.map_err(submission_error)?;

        Ok(InitiatedPayment {
            token: session.token,
            redirect_url: session.redirect_url,
            order_id: transaction_id,
        })
    }

    pub fn build_payload(&self, order: &ValidatedOrder, transaction_id: String) -> SnapTransactionRequest {
        SnapTransactionRequest {
            transaction_details: TransactionDetails {
                order_id: transaction_id,
                gross_amount: order.amount,
            },
            customer_details: CustomerDetails {
                first_name: order.customer_name.clone(),
                email: order
                    .customer_email
                    .clone()
                    .unwrap_or_else(|| self.config.default_email.clone()),
                phone: order
                    .customer_phone
                    .clone()
                    .unwrap_or_else(|| self.config.default_phone.clone()),
            },
            item_details: order.items.iter().map(item_detail).collect(),
            enabled_payments: order.payment_method.clone().map(|method| vec![method]),
            callbacks: Some(Callbacks {
                finish: self.config.frontend_url.clone(),
            }),
        }
    }

    /// Creates a throwaway transaction to prove the credentials and endpoint work.
    pub async fn probe(&self) -> Result<ProbeResult, GatewayError> {
        let test_order_id = format!("TEST-{}", self.clock.next_stamp());
        let order = ValidatedOrder {
            order_id: test_order_id.clone(),
            amount: 10_000,
            customer_name: "Test Customer".into(),
            items: vec![OrderItem {
                name: "Test Item".into(),
                price: 10_000,
                quantity: 1,
            }],
            payment_method: None,
            customer_email: Some("test@example.com".into()),
            customer_phone: None,
        };
        let mut payload = self.build_payload(&order, test_order_id.clone());
        payload.callbacks = None;
        let session = self.gateway.create_transaction(&payload).await?;
        Ok(ProbeResult { test_order_id, session })
    }
}

fn item_detail(item: &OrderItem) -> ItemDetail {
    ItemDetail {
        id: item_slug(&item.name),
        price: item.price,
        quantity: item.quantity,
        name: item.name.clone(),
    }
}

fn submission_error(err: GatewayError) -> CheckoutError {
    match err {
        GatewayError::Api { status, message, body } => CheckoutError::GatewayRejected {
            status,
            message,
            details: body,
        },
        other => CheckoutError::internal(other),
    }
}
