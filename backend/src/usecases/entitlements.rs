use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::{
    repositories::subscriptions::SubscriptionRepository,
    value_objects::{
        enums::subscription_statuses::SubscriptionStatus,
        subscriptions::{
            ExpiringSubscriptionDto, ExpirySweepReport, SubscriptionMetrics,
            SubscriptionStatusDto,
        },
    },
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("no active subscription")]
    NoActiveSubscription,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EntitlementError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            EntitlementError::NoActiveSubscription => StatusCode::NOT_FOUND,
            EntitlementError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type EntitlementResult<T> = std::result::Result<T, EntitlementError>;

/// Read side of the subsystem: every premium-gated endpoint asks this
/// service, and only this service, whether a user is entitled.
pub struct EntitlementUseCase<S>
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    subscription_repo: Arc<S>,
}

impl<S> EntitlementUseCase<S>
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    pub fn new(subscription_repo: Arc<S>) -> Self {
        Self { subscription_repo }
    }

    pub async fn is_active(&self, user_id: Uuid) -> EntitlementResult<bool> {
        let active = self
            .subscription_repo
            .find_current_active_subscription(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "entitlements: failed to load active subscription");
                EntitlementError::Internal(err)
            })?;

        if active.is_some() {
            return Ok(true);
        }

        // Lazy sweep on the negative path: a stale-ACTIVE row reads as
        // inactive and is expired in passing, so correctness never waits
        // for the scheduled sweep.
        let swept = self
            .subscription_repo
            .sweep_expired_for_user(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "entitlements: failed to sweep expired rows");
                EntitlementError::Internal(err)
            })?;
        if swept > 0 {
            info!(%user_id, swept, "entitlements: expired stale subscriptions on read");
        }

        Ok(false)
    }

    pub async fn get_status(&self, user_id: Uuid) -> EntitlementResult<SubscriptionStatusDto> {
        let active = self
            .subscription_repo
            .find_current_active_subscription(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "entitlements: failed to load active subscription");
                EntitlementError::Internal(err)
            })?;

        if let Some(subscription) = active {
            let days_remaining = (subscription.expires_at - Utc::now()).num_days();
            return Ok(SubscriptionStatusDto {
                has_subscription: true,
                is_active: true,
                plan: Some(subscription.plan),
                provider: Some(subscription.provider),
                status: Some(SubscriptionStatus::from_str(&subscription.status)),
                expires_at: Some(subscription.expires_at),
                days_remaining: Some(days_remaining),
                cancellation_pending: !subscription.auto_renew,
            });
        }

        let latest = self
            .subscription_repo
            .find_latest_subscription(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "entitlements: failed to load latest subscription");
                EntitlementError::Internal(err)
            })?;

        match latest {
            Some(subscription) => {
                let mut status = SubscriptionStatus::from_str(&subscription.status);
                // A stale-ACTIVE row that the sweep has not reached yet must
                // read as expired.
                if status == SubscriptionStatus::Active && subscription.expires_at <= Utc::now() {
                    status = SubscriptionStatus::Expired;
                }
                Ok(SubscriptionStatusDto {
                    has_subscription: true,
                    is_active: false,
                    plan: Some(subscription.plan),
                    provider: Some(subscription.provider),
                    status: Some(status),
                    expires_at: Some(subscription.expires_at),
                    days_remaining: None,
                    cancellation_pending: false,
                })
            }
            None => Ok(SubscriptionStatusDto::none()),
        }
    }

    /// Revokes renewal, not access: the row stays ACTIVE with its
    /// expires_at untouched and keeps granting entitlement until then.
    pub async fn cancel(&self, user_id: Uuid) -> EntitlementResult<DateTime<Utc>> {
        let subscription = self
            .subscription_repo
            .find_current_active_subscription(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "entitlements: failed to load subscription for cancel");
                EntitlementError::Internal(err)
            })?
            .ok_or_else(|| {
                let err = EntitlementError::NoActiveSubscription;
                warn!(
                    %user_id,
                    status = err.status_code().as_u16(),
                    "entitlements: no active subscription to cancel"
                );
                err
            })?;

        self.subscription_repo
            .cancel_auto_renew(subscription.id)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    subscription_id = %subscription.id,
                    db_error = ?err,
                    "entitlements: failed to revoke auto renew"
                );
                EntitlementError::Internal(err)
            })?;

        info!(
            %user_id,
            subscription_id = %subscription.id,
            expires_at = %subscription.expires_at,
            "entitlements: renewal revoked, access runs until expiry"
        );

        Ok(subscription.expires_at)
    }

    pub async fn cleanup_expired_subscriptions(&self) -> EntitlementResult<ExpirySweepReport> {
        let report = self
            .subscription_repo
            .sweep_all_expired()
            .await
            .map_err(|err| {
                error!(db_error = ?err, "entitlements: expiry sweep failed");
                EntitlementError::Internal(err)
            })?;

        info!(
            swept = report.swept,
            users_cleared = report.users_cleared,
            "entitlements: expiry sweep completed"
        );

        Ok(report)
    }

    pub async fn expiring_soon(
        &self,
        threshold_days: i64,
    ) -> EntitlementResult<Vec<ExpiringSubscriptionDto>> {
        let rows = self
            .subscription_repo
            .list_expiring_soon(threshold_days)
            .await
            .map_err(|err| {
                error!(db_error = ?err, "entitlements: failed to list expiring subscriptions");
                EntitlementError::Internal(err)
            })?;

        let now = Utc::now();
        Ok(rows
            .into_iter()
            .map(|row| ExpiringSubscriptionDto {
                user_id: row.user_id,
                plan: row.plan,
                provider: row.provider,
                expires_at: row.expires_at,
                days_remaining: (row.expires_at - now).num_days(),
            })
            .collect())
    }

    pub async fn get_metrics(&self) -> EntitlementResult<SubscriptionMetrics> {
        let metrics = self
            .subscription_repo
            .collect_metrics()
            .await
            .map_err(|err| {
                error!(db_error = ?err, "entitlements: failed to collect metrics");
                EntitlementError::Internal(err)
            })?;

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::{
        entities::subscriptions::SubscriptionEntity,
        repositories::subscriptions::MockSubscriptionRepository,
    };
    use mockall::predicate::eq;

    fn sample_subscription(
        user_id: Uuid,
        expires_in: Duration,
        auto_renew: bool,
    ) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id,
            plan: "monthly".to_string(),
            status: SubscriptionStatus::Active.to_string(),
            provider: "apple".to_string(),
            product_id: "com.safescan.premium.monthly".to_string(),
            original_transaction_id: "txn-1".to_string(),
            started_at: now - Duration::days(1),
            expires_at: now + expires_in,
            cancelled_at: None,
            latest_receipt: "receipt-blob".to_string(),
            price_minor: 499,
            currency: "USD".to_string(),
            auto_renew,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn active_subscription_grants_entitlement() {
        let user_id = Uuid::new_v4();
        let subscription = sample_subscription(user_id, Duration::days(10), true);

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_current_active_subscription()
            .with(eq(user_id))
            .returning(move |_| {
                let subscription = subscription.clone();
                Box::pin(async move { Ok(Some(subscription)) })
            });
        subscription_repo.expect_sweep_expired_for_user().never();

        let usecase = EntitlementUseCase::new(Arc::new(subscription_repo));

        assert!(usecase.is_active(user_id).await.unwrap());
    }

    #[tokio::test]
    async fn negative_read_sweeps_stale_rows() {
        let user_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_current_active_subscription()
            .with(eq(user_id))
            .returning(|_| Box::pin(async { Ok(None) }));
        subscription_repo
            .expect_sweep_expired_for_user()
            .with(eq(user_id))
            .times(1)
            .returning(|_| Box::pin(async { Ok(1) }));

        let usecase = EntitlementUseCase::new(Arc::new(subscription_repo));

        assert!(!usecase.is_active(user_id).await.unwrap());
    }

    #[tokio::test]
    async fn cancel_preserves_access_until_expiry() {
        let user_id = Uuid::new_v4();
        let subscription = sample_subscription(user_id, Duration::days(12), true);
        let subscription_id = subscription.id;
        let expires_at = subscription.expires_at;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_current_active_subscription()
            .with(eq(user_id))
            .returning(move |_| {
                let subscription = subscription.clone();
                Box::pin(async move { Ok(Some(subscription)) })
            });
        subscription_repo
            .expect_cancel_auto_renew()
            .with(eq(subscription_id))
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));

        let usecase = EntitlementUseCase::new(Arc::new(subscription_repo));

        let returned = usecase.cancel(user_id).await.unwrap();
        assert_eq!(returned, expires_at);
    }

    #[tokio::test]
    async fn cancel_without_active_subscription_fails() {
        let user_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_current_active_subscription()
            .with(eq(user_id))
            .returning(|_| Box::pin(async { Ok(None) }));
        subscription_repo.expect_cancel_auto_renew().never();

        let usecase = EntitlementUseCase::new(Arc::new(subscription_repo));

        let result = usecase.cancel(user_id).await;
        assert!(matches!(
            result,
            Err(EntitlementError::NoActiveSubscription)
        ));
    }

    #[tokio::test]
    async fn status_reports_cancellation_pending_during_grace_period() {
        let user_id = Uuid::new_v4();
        let subscription = sample_subscription(user_id, Duration::days(5), false);

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_current_active_subscription()
            .with(eq(user_id))
            .returning(move |_| {
                let subscription = subscription.clone();
                Box::pin(async move { Ok(Some(subscription)) })
            });

        let usecase = EntitlementUseCase::new(Arc::new(subscription_repo));

        let status = usecase.get_status(user_id).await.unwrap();
        assert!(status.is_active);
        assert!(status.cancellation_pending);
        assert_eq!(status.days_remaining, Some(4));
    }

    #[tokio::test]
    async fn status_reads_stale_active_row_as_expired() {
        let user_id = Uuid::new_v4();
        let mut subscription = sample_subscription(user_id, Duration::days(3), true);
        subscription.expires_at = Utc::now() - Duration::days(1);

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_current_active_subscription()
            .with(eq(user_id))
            .returning(|_| Box::pin(async { Ok(None) }));
        subscription_repo
            .expect_find_latest_subscription()
            .with(eq(user_id))
            .returning(move |_| {
                let subscription = subscription.clone();
                Box::pin(async move { Ok(Some(subscription)) })
            });

        let usecase = EntitlementUseCase::new(Arc::new(subscription_repo));

        let status = usecase.get_status(user_id).await.unwrap();
        assert!(status.has_subscription);
        assert!(!status.is_active);
        assert_eq!(status.status, Some(SubscriptionStatus::Expired));
    }

    #[tokio::test]
    async fn status_without_history_reports_none() {
        let user_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_current_active_subscription()
            .with(eq(user_id))
            .returning(|_| Box::pin(async { Ok(None) }));
        subscription_repo
            .expect_find_latest_subscription()
            .with(eq(user_id))
            .returning(|_| Box::pin(async { Ok(None) }));

        let usecase = EntitlementUseCase::new(Arc::new(subscription_repo));

        let status = usecase.get_status(user_id).await.unwrap();
        assert_eq!(status, SubscriptionStatusDto::none());
    }

    #[tokio::test]
    async fn expiring_soon_maps_days_remaining() {
        let user_id = Uuid::new_v4();
        let subscription = sample_subscription(user_id, Duration::days(3), false);

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_list_expiring_soon()
            .with(eq(3))
            .returning(move |_| {
                let subscription = subscription.clone();
                Box::pin(async move { Ok(vec![subscription]) })
            });

        let usecase = EntitlementUseCase::new(Arc::new(subscription_repo));

        let expiring = usecase.expiring_soon(3).await.unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].user_id, user_id);
        assert_eq!(expiring[0].days_remaining, 2);
    }
}
