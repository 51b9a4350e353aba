use serde::{Deserialize, Serialize};

/// Simplified payment state tracked for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    /// Maps the gateway's `(transaction_status, fraud_status)` pair.
    ///
    /// | transaction status       | fraud status | result  |
    /// |--------------------------|--------------|---------|
    /// | capture                  | accept       | paid    |
    /// | capture                  | other/absent | pending |
    /// | settlement               | any          | paid    |
    /// | cancel / deny / expire   | any          | failed  |
    /// | pending / anything else  | any          | pending |
    pub fn from_gateway(transaction_status: &str, fraud_status: Option<&str>) -> Self {
        match (transaction_status, fraud_status) {
            ("capture", Some("accept")) => PaymentStatus::Paid,
            ("capture", _) => PaymentStatus::Pending,
            ("settlement", _) => PaymentStatus::Paid,
            ("cancel" | "deny" | "expire", _) => PaymentStatus::Failed,
            ("pending", _) => PaymentStatus::Pending,
            _ => PaymentStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentStatus> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Failed)
    }

    /// A late `pending` never replaces a settled outcome; everything else does.
    pub fn may_replace(&self, existing: PaymentStatus) -> bool {
        !(existing.is_terminal() && *self == PaymentStatus::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
