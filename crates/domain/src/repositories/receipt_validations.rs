use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::receipt_validations::{
    InsertReceiptValidationEntity, ReceiptValidationEntity,
};

/// Append-only audit trail of validation attempts, successful or not.
#[async_trait]
#[automock]
pub trait ReceiptValidationRepository {
    async fn record_validation(&self, entry: InsertReceiptValidationEntity) -> Result<Uuid>;

    /// Replay detection: how many attempts have carried this exact receipt.
    async fn count_by_receipt_hash(&self, receipt_hash: &str) -> Result<i64>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ReceiptValidationEntity>>;
}
