use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use diesel::{RunQueryDsl, insert_into, prelude::*, update, upsert::excluded};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::db::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::{
        receipt_validations::InsertReceiptValidationEntity,
        subscriptions::{
            InsertSubscriptionRevisionEntity, SubscriptionEntity, UpsertSubscriptionEntity,
        },
    },
    repositories::subscriptions::SubscriptionRepository,
    schema::{app_users, receipt_validations, subscription_revisions, subscriptions},
    value_objects::{
        enums::{
            subscription_plans::SubscriptionPlan, subscription_statuses::SubscriptionStatus,
        },
        subscriptions::{BulkUpsertReport, ExpirySweepReport, SubscriptionMetrics, UpsertOutcome},
    },
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }

    /// One conflict-resolving round trip. Identity columns stay out of the
    /// update set; only mutable fields take the excluded values.
    fn upsert_row(
        conn: &mut PgConnection,
        upsert: &UpsertSubscriptionEntity,
    ) -> Result<(SubscriptionEntity, UpsertOutcome), diesel::result::Error> {
        let row = insert_into(subscriptions::table)
            .values(upsert)
            .on_conflict((
                subscriptions::user_id,
                subscriptions::original_transaction_id,
            ))
            .do_update()
            .set((
                subscriptions::status.eq(excluded(subscriptions::status)),
                subscriptions::expires_at.eq(excluded(subscriptions::expires_at)),
                subscriptions::cancelled_at.eq(excluded(subscriptions::cancelled_at)),
                subscriptions::latest_receipt.eq(excluded(subscriptions::latest_receipt)),
                subscriptions::auto_renew.eq(excluded(subscriptions::auto_renew)),
                subscriptions::price_minor.eq(excluded(subscriptions::price_minor)),
                subscriptions::currency.eq(excluded(subscriptions::currency)),
                subscriptions::updated_at.eq(excluded(subscriptions::updated_at)),
            ))
            .returning(SubscriptionEntity::as_returning())
            .get_result::<SubscriptionEntity>(conn)?;

        // Inserts stamp created_at == updated_at; the conflict arm only
        // moves updated_at.
        let outcome = if row.created_at == row.updated_at {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        };

        Ok((row, outcome))
    }

    fn has_active_subscription(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<bool, diesel::result::Error> {
        let active_id = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
            .filter(subscriptions::expires_at.gt(Utc::now()))
            .select(subscriptions::id)
            .first::<Uuid>(conn)
            .optional()?;

        Ok(active_id.is_some())
    }

    fn set_subscribed_flag(
        conn: &mut PgConnection,
        user_id: Uuid,
        is_subscribed: bool,
    ) -> Result<usize, diesel::result::Error> {
        update(app_users::table)
            .filter(app_users::id.eq(user_id))
            .set((
                app_users::is_subscribed.eq(is_subscribed),
                app_users::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn upsert_validated_purchase(
        &self,
        upsert: UpsertSubscriptionEntity,
        audit: InsertReceiptValidationEntity,
    ) -> Result<(SubscriptionEntity, UpsertOutcome)> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let (row, outcome) = Self::upsert_row(conn, &upsert)?;

            Self::set_subscribed_flag(conn, row.user_id, true)?;

            let mut audit = audit;
            audit.subscription_id = Some(row.id);
            insert_into(receipt_validations::table)
                .values(&audit)
                .execute(conn)?;

            Ok((row, outcome))
        })?;

        Ok(result)
    }

    async fn upsert_many(
        &self,
        records: Vec<UpsertSubscriptionEntity>,
        log_revisions: bool,
    ) -> Result<BulkUpsertReport> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let mut report = BulkUpsertReport {
            attempted: records.len(),
            ..Default::default()
        };

        for record in records {
            if record.user_id.is_nil() || record.original_transaction_id.trim().is_empty() {
                warn!(
                    user_id = %record.user_id,
                    "subscriptions: skipping malformed record in bulk upsert"
                );
                report.failed += 1;
                continue;
            }

            match Self::upsert_row(&mut conn, &record) {
                Ok((row, outcome)) => {
                    match outcome {
                        UpsertOutcome::Inserted => report.inserted += 1,
                        UpsertOutcome::Updated => report.updated += 1,
                    }

                    if log_revisions {
                        insert_into(subscription_revisions::table)
                            .values(&InsertSubscriptionRevisionEntity {
                                subscription_id: row.id,
                                user_id: row.user_id,
                                status: row.status.clone(),
                                expires_at: row.expires_at,
                                auto_renew: row.auto_renew,
                                recorded_at: Utc::now(),
                            })
                            .execute(&mut conn)?;
                    }
                }
                Err(err) => {
                    warn!(
                        user_id = %record.user_id,
                        db_error = ?err,
                        "subscriptions: record failed in bulk upsert"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn find_current_active_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
            .filter(subscriptions::expires_at.gt(Utc::now()))
            .order(subscriptions::expires_at.desc())
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn find_latest_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .order(subscriptions::updated_at.desc())
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn sweep_expired_for_user(&self, user_id: Uuid) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let swept = conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let now = Utc::now();
            let swept = update(subscriptions::table)
                .filter(subscriptions::user_id.eq(user_id))
                .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
                .filter(subscriptions::expires_at.le(now))
                .set((
                    subscriptions::status.eq(SubscriptionStatus::Expired.to_string()),
                    subscriptions::updated_at.eq(now),
                ))
                .execute(conn)?;

            if swept > 0 && !Self::has_active_subscription(conn, user_id)? {
                Self::set_subscribed_flag(conn, user_id, false)?;
            }

            Ok(swept)
        })?;

        Ok(swept)
    }

    async fn sweep_all_expired(&self) -> Result<ExpirySweepReport> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let report = conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let now = Utc::now();
            let mut affected_users = update(subscriptions::table)
                .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
                .filter(subscriptions::expires_at.le(now))
                .set((
                    subscriptions::status.eq(SubscriptionStatus::Expired.to_string()),
                    subscriptions::updated_at.eq(now),
                ))
                .returning(subscriptions::user_id)
                .get_results::<Uuid>(conn)?;

            let swept = affected_users.len();
            affected_users.sort_unstable();
            affected_users.dedup();

            // A user may hold more than one purchase chain; only clear the
            // flag once no active row remains.
            let mut users_cleared = 0;
            for user_id in affected_users {
                if !Self::has_active_subscription(conn, user_id)? {
                    Self::set_subscribed_flag(conn, user_id, false)?;
                    users_cleared += 1;
                }
            }

            Ok(ExpirySweepReport {
                swept,
                users_cleared,
            })
        })?;

        Ok(report)
    }

    async fn cancel_auto_renew(&self, subscription_id: Uuid) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // Cancellation revokes renewal, not current access: status and
        // expires_at stay as they are.
        update(subscriptions::table)
            .filter(subscriptions::id.eq(subscription_id))
            .set((
                subscriptions::auto_renew.eq(false),
                subscriptions::cancelled_at.eq(Some(Utc::now())),
                subscriptions::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn list_expiring_soon(&self, within_days: i64) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let now = Utc::now();
        let threshold = now + Duration::days(within_days.max(0));
        let results = subscriptions::table
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
            .filter(subscriptions::auto_renew.eq(false))
            .filter(subscriptions::expires_at.gt(now))
            .filter(subscriptions::expires_at.le(threshold))
            .order(subscriptions::expires_at.asc())
            .select(SubscriptionEntity::as_select())
            .load::<SubscriptionEntity>(&mut conn)?;

        Ok(results)
    }

    async fn collect_metrics(&self) -> Result<SubscriptionMetrics> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let now = Utc::now();

        let active_total = subscriptions::table
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
            .filter(subscriptions::expires_at.gt(now))
            .count()
            .get_result::<i64>(&mut conn)?;

        let active_monthly = subscriptions::table
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
            .filter(subscriptions::expires_at.gt(now))
            .filter(subscriptions::plan.eq(SubscriptionPlan::Monthly.to_string()))
            .count()
            .get_result::<i64>(&mut conn)?;

        let active_annual = subscriptions::table
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
            .filter(subscriptions::expires_at.gt(now))
            .filter(subscriptions::plan.eq(SubscriptionPlan::Annual.to_string()))
            .count()
            .get_result::<i64>(&mut conn)?;

        let cancelled_but_active = subscriptions::table
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
            .filter(subscriptions::expires_at.gt(now))
            .filter(subscriptions::cancelled_at.is_not_null())
            .count()
            .get_result::<i64>(&mut conn)?;

        let expired_total = subscriptions::table
            .filter(subscriptions::status.eq(SubscriptionStatus::Expired.to_string()))
            .count()
            .get_result::<i64>(&mut conn)?;

        Ok(SubscriptionMetrics {
            active_total,
            active_monthly,
            active_annual,
            cancelled_but_active,
            expired_total,
        })
    }
}
