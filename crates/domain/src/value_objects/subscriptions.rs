use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::subscriptions::SubscriptionEntity;
use crate::value_objects::enums::subscription_statuses::SubscriptionStatus;

#[derive(Debug, Deserialize)]
pub struct ValidateReceiptRequest {
    pub provider: String,
    pub receipt: String,
    pub product_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateReceiptResponse {
    pub success: bool,
    pub subscription: Option<SubscriptionDto>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscriptionDto {
    pub id: Uuid,
    pub plan: String,
    pub status: String,
    pub provider: String,
    pub product_id: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub auto_renew: bool,
}

impl From<SubscriptionEntity> for SubscriptionDto {
    fn from(value: SubscriptionEntity) -> Self {
        Self {
            id: value.id,
            plan: value.plan,
            status: value.status,
            provider: value.provider,
            product_id: value.product_id,
            started_at: value.started_at,
            expires_at: value.expires_at,
            cancelled_at: value.cancelled_at,
            auto_renew: value.auto_renew,
        }
    }
}

/// Richer read-side summary for the account screen: the active row if one
/// exists, otherwise the most recent inactive row, otherwise "none".
#[derive(Debug, Serialize, PartialEq)]
pub struct SubscriptionStatusDto {
    pub has_subscription: bool,
    pub is_active: bool,
    pub plan: Option<String>,
    pub provider: Option<String>,
    pub status: Option<SubscriptionStatus>,
    pub expires_at: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
    /// Auto-renew was switched off while the row is still active: the user
    /// cancelled and is riding out the grace period.
    pub cancellation_pending: bool,
}

impl SubscriptionStatusDto {
    pub fn none() -> Self {
        Self {
            has_subscription: false,
            is_active: false,
            plan: None,
            provider: None,
            status: None,
            expires_at: None,
            days_remaining: None,
            cancellation_pending: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CancelSubscriptionResponse {
    pub success: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExpiringSubscriptionDto {
    pub user_id: Uuid,
    pub plan: String,
    pub provider: String,
    pub expires_at: DateTime<Utc>,
    pub days_remaining: i64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SubscriptionMetrics {
    pub active_total: i64,
    pub active_monthly: i64,
    pub active_annual: i64,
    pub cancelled_but_active: i64,
    pub expired_total: i64,
}

/// Whether the conflict-aware write inserted a fresh row or updated the
/// existing chain. Logging and metrics only; callers must not branch
/// application logic on this.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BulkUpsertReport {
    pub attempted: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpirySweepReport {
    pub swept: usize,
    pub users_cleared: usize,
}
