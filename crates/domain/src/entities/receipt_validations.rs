use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::receipt_validations;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = receipt_validations)]
pub struct ReceiptValidationEntity {
    pub id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub user_id: Uuid,
    pub provider: String,
    pub product_id: Option<String>,
    pub receipt_hash: String,
    pub transaction_id: Option<String>,
    pub is_valid: bool,
    pub error_message: Option<String>,
    pub validated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = receipt_validations)]
pub struct InsertReceiptValidationEntity {
    pub subscription_id: Option<Uuid>,
    pub user_id: Uuid,
    pub provider: String,
    pub product_id: Option<String>,
    pub receipt_hash: String,
    pub transaction_id: Option<String>,
    pub is_valid: bool,
    pub error_message: Option<String>,
    pub validated_at: DateTime<Utc>,
}
