use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider-agnostic view of a verified purchase, produced by the Apple and
/// Google clients so the validation layer never branches on provider shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptInfo {
    /// SKU embedded in the receipt. Google receipts carry no SKU, so the
    /// caller's hint fills the gap downstream.
    pub product_id: Option<String>,
    pub transaction_id: String,
    /// Stable across every renewal of one purchase chain; together with the
    /// user id this is the deduplication key.
    pub original_transaction_id: String,
    pub purchase_date: DateTime<Utc>,
    pub expires_date: DateTime<Utc>,
    pub is_trial: bool,
    /// `None` when the provider response omitted renewal intent.
    pub auto_renew: Option<bool>,
}
