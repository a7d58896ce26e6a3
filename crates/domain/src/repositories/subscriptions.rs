use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::receipt_validations::InsertReceiptValidationEntity;
use crate::entities::subscriptions::{SubscriptionEntity, UpsertSubscriptionEntity};
use crate::value_objects::subscriptions::{
    BulkUpsertReport, ExpirySweepReport, SubscriptionMetrics, UpsertOutcome,
};

/// The only write path for subscription rows. Everything that mutates the
/// `subscriptions` table goes through this trait so the conflict-aware
/// upsert stays the single serialization point.
#[async_trait]
#[automock]
pub trait SubscriptionRepository {
    /// Conflict-aware write keyed on `(user_id, original_transaction_id)`,
    /// committed atomically with the owner's `is_subscribed` flag and the
    /// success audit row.
    async fn upsert_validated_purchase(
        &self,
        upsert: UpsertSubscriptionEntity,
        audit: InsertReceiptValidationEntity,
    ) -> Result<(SubscriptionEntity, UpsertOutcome)>;

    /// Batch variant: each record is written independently; a malformed
    /// record counts as failed without aborting the rest. `log_revisions`
    /// side-writes a change-history row per applied record.
    async fn upsert_many(
        &self,
        records: Vec<UpsertSubscriptionEntity>,
        log_revisions: bool,
    ) -> Result<BulkUpsertReport>;

    async fn find_current_active_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionEntity>>;

    async fn find_latest_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionEntity>>;

    /// Transitions the user's stale-ACTIVE rows to EXPIRED and clears the
    /// denormalized flag when no active row remains.
    async fn sweep_expired_for_user(&self, user_id: Uuid) -> Result<usize>;

    /// Housekeeping sweep across all users.
    async fn sweep_all_expired(&self) -> Result<ExpirySweepReport>;

    /// Revokes future renewal only: status and `expires_at` stay untouched.
    async fn cancel_auto_renew(&self, subscription_id: Uuid) -> Result<()>;

    async fn list_expiring_soon(&self, within_days: i64) -> Result<Vec<SubscriptionEntity>>;

    async fn collect_metrics(&self) -> Result<SubscriptionMetrics>;
}
