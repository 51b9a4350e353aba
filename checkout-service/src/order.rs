use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CheckoutError, CheckoutResult};

/// Order as posted by the storefront. Everything is optional here so that
/// missing fields surface as a validation error instead of a decode error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub order_id: Option<String>,
    pub amount: Option<Value>,
    pub customer_name: Option<String>,
    pub order_items: Option<Vec<OrderItem>>,
    pub payment_method: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub price: i64,
    pub quantity: u32,
}

/// An order that passed every check and may be sent to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOrder {
    pub order_id: String,
    pub amount: i64,
    pub customer_name: String,
    pub items: Vec<OrderItem>,
    pub payment_method: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

pub const MISSING_FIELDS_MESSAGE: &str =
    "Incomplete order data. orderId, amount, customerName and orderItems are required.";
pub const INVALID_AMOUNT_MESSAGE: &str = "Amount must be a positive number";

impl OrderRequest {
    /// Checks required fields first, then the amount. Credentials are checked by the initiator.
    pub fn validate(self) -> CheckoutResult<ValidatedOrder> {
        let order_id = non_blank(self.order_id);
        let customer_name = non_blank(self.customer_name);
        let amount = self.amount.filter(|v| !v.is_null());
        let (Some(order_id), Some(amount), Some(customer_name), Some(items)) =
            (order_id, amount, customer_name, self.order_items)
        else {
            return Err(CheckoutError::invalid(MISSING_FIELDS_MESSAGE));
        };
        if items.is_empty() {
            return Err(CheckoutError::invalid("orderItems must contain at least one item"));
        }
        if items.iter().any(|item| item.name.trim().is_empty()) {
            return Err(CheckoutError::invalid("Every order item needs a name"));
        }

        let amount = positive_amount(&amount).ok_or_else(|| CheckoutError::invalid(INVALID_AMOUNT_MESSAGE))?;

        Ok(ValidatedOrder {
            order_id,
            amount,
            customer_name,
            items,
            payment_method: non_blank(self.payment_method),
            customer_email: non_blank(self.customer_email),
            customer_phone: non_blank(self.customer_phone),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts JSON integers (or integral floats such as `50000.0`) greater than zero.
fn positive_amount(value: &Value) -> Option<i64> {
    let Value::Number(number) = value else {
        return None;
    };
    if let Some(amount) = number.as_i64() {
        return (amount > 0).then_some(amount);
    }
    let float = number.as_f64()?;
    if float.is_finite() && float > 0.0 && float.fract() == 0.0 && float < i64::MAX as f64 {
        Some(float as i64)
    } else {
        None
    }
}

/// Item id sent to the gateway: lower-cased, whitespace runs collapsed to `-`.
pub fn item_slug(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Millisecond clock that never hands out the same stamp twice within a process.
#[derive(Debug, Default)]
pub struct TransactionIdClock {
    last: AtomicI64,
}

impl TransactionIdClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = if now > prev { now } else { prev + 1 };
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// `<client order id>-<stamp>`; the gateway treats this as the unique transaction key.
    pub fn transaction_id(&self, order_id: &str) -> String {
        format!("{order_id}-{}", self.next_stamp())
    }
}
