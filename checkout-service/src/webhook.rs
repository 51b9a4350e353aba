use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

/// Callback body pushed by the gateway. Nothing here is trusted until the
/// status API confirms it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentNotification {
    #[serde(default, deserialize_with = "string_or_number")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub transaction_status: Option<String>,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub status_code: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub gross_amount: Option<String>,
    #[serde(default)]
    pub signature_key: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PaymentNotification {
    /// Identifier to verify against: the gateway transaction id, else the order id.
    pub fn lookup_id(&self) -> Option<&str> {
        self.transaction_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| self.order_id.as_deref().filter(|id| !id.trim().is_empty()))
    }
}

// The gateway sends `gross_amount` as a string ("50000.00"). A JSON number is
// re-rendered by serde_json (`50000.0`), so a signed numeric amount will not match.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// `hex(SHA-512(order_id + status_code + gross_amount + server_key))`
pub fn expected_signature(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Checks `signature_key` when the payload carries one. A payload without a
/// signature passes; the status API lookup is still mandatory.
pub fn verify_signature_key(notification: &PaymentNotification, server_key: &str) -> bool {
    let Some(provided) = notification.signature_key.as_deref() else {
        return true;
    };
    let expected = expected_signature(
        notification.order_id.as_deref().unwrap_or_default(),
        notification.status_code.as_deref().unwrap_or_default(),
        notification.gross_amount.as_deref().unwrap_or_default(),
        server_key,
    );
    let provided = provided.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() == 1
}
