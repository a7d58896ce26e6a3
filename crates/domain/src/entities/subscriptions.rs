use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::subscriptions;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan: String,
    pub status: String,
    pub provider: String,
    pub product_id: String,
    pub original_transaction_id: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub latest_receipt: String,
    pub price_minor: i32,
    pub currency: String,
    pub auto_renew: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Candidate row for the conflict-aware write keyed on
/// `(user_id, original_transaction_id)`. An insert stamps
/// `created_at == updated_at`; the conflict arm only moves `updated_at`.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct UpsertSubscriptionEntity {
    pub user_id: Uuid,
    pub plan: String,
    pub status: String,
    pub provider: String,
    pub product_id: String,
    pub original_transaction_id: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub latest_receipt: String,
    pub price_minor: i32,
    pub currency: String,
    pub auto_renew: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::subscription_revisions)]
pub struct InsertSubscriptionRevisionEntity {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub auto_renew: bool,
    pub recorded_at: DateTime<Utc>,
}
