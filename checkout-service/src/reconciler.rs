use std::sync::Arc;

use common_observability::CheckoutMetrics;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MidtransConfig;
use crate::error::{CheckoutError, CheckoutResult};
use crate::gateway::{GatewayError, PaymentGateway};
use crate::status::PaymentStatus;
use crate::store::{PaymentStatusRecord, PaymentStatusStore, UpsertOutcome};
use crate::webhook::{verify_signature_key, PaymentNotification};

/// Returned when the status API could not be reached or read; detail stays in the log.
pub const UNVERIFIED_MESSAGE: &str = "Notification could not be verified";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledNotification {
    pub transaction_id: String,
    pub payment_status: PaymentStatus,
    pub transaction_status: String,
    pub fraud_status: Option<String>,
    #[serde(skip)]
    pub outcome: UpsertOutcome,
}

/// Verifies gateway callbacks against the status API and records the derived status.
pub struct NotificationReconciler {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn PaymentStatusStore>,
    server_key: String,
    verify_signature: bool,
    metrics: Option<Arc<CheckoutMetrics>>,
}

impl NotificationReconciler {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn PaymentStatusStore>, config: &MidtransConfig) -> Self {
        Self {
            gateway,
            store,
            server_key: config.server_key.clone(),
            verify_signature: config.verify_signature,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<CheckoutMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn reconcile(&self, notification: PaymentNotification) -> CheckoutResult<ReconciledNotification> {
        info!(
            order_id = notification.order_id.as_deref().unwrap_or("-"),
            transaction_id = notification.transaction_id.as_deref().unwrap_or("-"),
            claimed_status = notification.transaction_status.as_deref().unwrap_or("-"),
            "Payment notification received"
        );

        if self.verify_signature && !verify_signature_key(&notification, &self.server_key) {
            warn!(order_id = notification.order_id.as_deref().unwrap_or("-"), "Notification signature mismatch");
            return Err(CheckoutError::VerificationFailed("Invalid notification signature".into()));
        }

        let lookup_id = notification
            .lookup_id()
            .ok_or_else(|| CheckoutError::VerificationFailed("Notification carries no transaction identifier".into()))?
            .to_string();

        let verified = self
            .gateway
            .transaction_status(&lookup_id)
            .await
            .map_err(|err| verification_error(&lookup_id, err))?;

        let payment_status = PaymentStatus::from_gateway(&verified.transaction_status, verified.fraud_status.as_deref());
        info!(
            transaction_id = %verified.order_id,
            transaction_status = %verified.transaction_status,
            fraud_status = verified.fraud_status.as_deref().unwrap_or("-"),
            payment_status = %payment_status,
            "Notification verified"
        );

        let record = PaymentStatusRecord::from_verified(&verified, payment_status);
        let outcome = self.store.upsert(record).await.map_err(CheckoutError::internal)?;
        if outcome == UpsertOutcome::KeptTerminal {
            info!(transaction_id = %verified.order_id, "Stored status is final; pending update ignored");
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_notification(payment_status.as_str());
        }

        Ok(ReconciledNotification {
            transaction_id: verified.order_id,
            payment_status,
            transaction_status: verified.transaction_status,
            fraud_status: verified.fraud_status,
            outcome,
        })
    }
}

fn verification_error(lookup_id: &str, err: GatewayError) -> CheckoutError {
    warn!(transaction_id = lookup_id, error = %err, "Notification verification failed");
    let message = match err {
        GatewayError::Api { message, .. } => message,
        GatewayError::Transport(_) | GatewayError::Decode(_) => UNVERIFIED_MESSAGE.to_string(),
    };
    CheckoutError::VerificationFailed(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayMode;
    use crate::gateway::fake::{status, ScriptedGateway};
    use crate::store::InMemoryPaymentStatusStore;
    use crate::webhook::expected_signature;
    use serde_json::json;

    const KEY: &str = "SB-Mid-server-unit";

    struct Harness {
        gateway: Arc<ScriptedGateway>,
        store: Arc<InMemoryPaymentStatusStore>,
        reconciler: NotificationReconciler,
    }

    fn harness() -> Harness {
        let gateway = Arc::new(ScriptedGateway::new());
        let store = Arc::new(InMemoryPaymentStatusStore::new());
        let config = MidtransConfig::new(GatewayMode::Sandbox, KEY, "SB-Mid-client-unit");
        let reconciler = NotificationReconciler::new(gateway.clone(), store.clone(), &config);
        Harness { gateway, store, reconciler }
    }

    fn notification(order_id: &str) -> PaymentNotification {
        serde_json::from_value(json!({
            "order_id": order_id,
            "transaction_status": "settlement",
            "status_code": "200",
            "gross_amount": "50000.00",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn settlement_is_recorded_as_paid() {
        let h = harness();
        h.gateway.push_status(Ok(status("ORD1-1", "settlement", None)));
        let result = h.reconciler.reconcile(notification("ORD1-1")).await.unwrap();
        assert_eq!(result.payment_status, PaymentStatus::Paid);
        assert_eq!(result.transaction_id, "ORD1-1");
        assert_eq!(*h.gateway.status_lookups.lock().unwrap(), vec!["ORD1-1".to_string()]);
        let stored = h.store.get("ORD1-1").await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn status_api_wins_over_payload_claim() {
        let h = harness();
        // Payload claims settlement; the gateway says the card was only challenged.
        h.gateway.push_status(Ok(status("ORD2-1", "capture", Some("challenge"))));
        let result = h.reconciler.reconcile(notification("ORD2-1")).await.unwrap();
        assert_eq!(result.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn transaction_id_is_used_for_lookup_when_present() {
        let h = harness();
        h.gateway.push_status(Ok(status("ORD3-1", "expire", None)));
        let mut n = notification("ORD3-1");
        n.transaction_id = Some("9aed5972-5b6a".into());
        let result = h.reconciler.reconcile(n).await.unwrap();
        assert_eq!(result.payment_status, PaymentStatus::Failed);
        assert_eq!(*h.gateway.status_lookups.lock().unwrap(), vec!["9aed5972-5b6a".to_string()]);
    }

    #[tokio::test]
    async fn replayed_notification_is_idempotent() {
        let h = harness();
        h.gateway.push_status(Ok(status("ORD4-1", "settlement", None)));
        h.gateway.push_status(Ok(status("ORD4-1", "settlement", None)));
        let first = h.reconciler.reconcile(notification("ORD4-1")).await.unwrap();
        let second = h.reconciler.reconcile(notification("ORD4-1")).await.unwrap();
        assert_eq!(first.payment_status, second.payment_status);
        assert_eq!(first.outcome, UpsertOutcome::Inserted);
        assert_eq!(second.outcome, UpsertOutcome::Updated);
        assert_eq!(h.store.get("ORD4-1").await.unwrap().unwrap().payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn late_pending_does_not_regress_paid() {
        let h = harness();
        h.gateway.push_status(Ok(status("ORD5-1", "settlement", None)));
        h.gateway.push_status(Ok(status("ORD5-1", "pending", None)));
        h.reconciler.reconcile(notification("ORD5-1")).await.unwrap();
        let late = h.reconciler.reconcile(notification("ORD5-1")).await.unwrap();
        assert_eq!(late.outcome, UpsertOutcome::KeptTerminal);
        assert_eq!(h.store.get("ORD5-1").await.unwrap().unwrap().payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn gateway_rejection_is_a_verification_failure() {
        let h = harness();
        h.gateway.push_status(Err(GatewayError::api(
            404,
            Some(json!({"status_code": "404", "status_message": "Transaction doesn't exist."})),
        )));
        let err = h.reconciler.reconcile(notification("ORD6-1")).await.unwrap_err();
        assert!(matches!(err, CheckoutError::VerificationFailed(ref m) if m == "Transaction doesn't exist."));
        assert!(h.store.get("ORD6-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transport_detail_is_not_returned() {
        let h = harness();
        h.gateway.push_status(Err(GatewayError::Transport(
            "error sending request for url (https://api.sandbox.midtrans.com/v2/ORD9-1/status)".into(),
        )));
        let err = h.reconciler.reconcile(notification("ORD9-1")).await.unwrap_err();
        assert!(matches!(err, CheckoutError::VerificationFailed(ref m) if m == UNVERIFIED_MESSAGE));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_deliveries_insert_once() {
        let h = harness();
        const DELIVERIES: usize = 16;
        for _ in 0..DELIVERIES {
            h.gateway.push_status(Ok(status("ORD10-1", "settlement", None)));
        }
        let reconciler = Arc::new(h.reconciler);
        let mut set = tokio::task::JoinSet::new();
        for _ in 0..DELIVERIES {
            let reconciler = reconciler.clone();
            set.spawn(async move { reconciler.reconcile(notification("ORD10-1")).await });
        }
        let mut inserted = 0;
        while let Some(joined) = set.join_next().await {
            let result = joined.unwrap().unwrap();
            assert_eq!(result.payment_status, PaymentStatus::Paid);
            if result.outcome == UpsertOutcome::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(h.gateway.status_lookups.lock().unwrap().len(), DELIVERIES);
        let stored = h.store.get("ORD10-1").await.unwrap().unwrap();
        assert!(stored.payment_status.is_terminal());
    }

    #[tokio::test]
    async fn forged_signature_makes_no_gateway_call() {
        let h = harness();
        let mut n = notification("ORD7-1");
        n.signature_key = Some(expected_signature("ORD7-1", "200", "50000.00", "attacker-key"));
        let err = h.reconciler.reconcile(n).await.unwrap_err();
        assert!(matches!(err, CheckoutError::VerificationFailed(_)));
        assert_eq!(h.gateway.calls(), 0);
    }

    #[tokio::test]
    async fn valid_signature_proceeds_to_lookup() {
        let h = harness();
        h.gateway.push_status(Ok(status("ORD8-1", "capture", Some("accept"))));
        let mut n = notification("ORD8-1");
        n.signature_key = Some(expected_signature("ORD8-1", "200", "50000.00", KEY));
        let result = h.reconciler.reconcile(n).await.unwrap();
        assert_eq!(result.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn missing_identifiers_fail_without_calls() {
        let h = harness();
        let err = h.reconciler.reconcile(PaymentNotification::default()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::VerificationFailed(_)));
        assert_eq!(h.gateway.calls(), 0);
    }
}
