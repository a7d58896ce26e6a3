use std::sync::Arc;

use chrono::Utc;
use domain::{
    entities::{
        receipt_validations::InsertReceiptValidationEntity,
        subscriptions::UpsertSubscriptionEntity,
    },
    repositories::{
        receipt_validations::ReceiptValidationRepository, subscriptions::SubscriptionRepository,
    },
    value_objects::{
        enums::{
            payment_providers::PaymentProvider, subscription_statuses::SubscriptionStatus,
        },
        product_catalog::ProductCatalog,
        subscriptions::SubscriptionDto,
    },
};
use providers::{ProviderRegistry, VerifyOutcome};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Receipt blobs can run to tens of kilobytes; keep enough for
/// re-verification without bloating the row.
const RETAINED_RECEIPT_CHARS: usize = 4096;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("could not verify purchase")]
    ReceiptRejected,
    #[error("purchase verification is temporarily unavailable")]
    ProviderUnavailable,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ValidationError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ValidationError::ReceiptRejected => StatusCode::UNPROCESSABLE_ENTITY,
            ValidationError::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ValidationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message; provider status codes and raw responses stay
    /// in the logs and the audit trail.
    pub fn public_message(&self) -> &'static str {
        match self {
            ValidationError::ReceiptRejected => "could not verify purchase",
            ValidationError::ProviderUnavailable => {
                "purchase verification is temporarily unavailable"
            }
            ValidationError::Internal(_) => "internal error",
        }
    }
}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

pub struct ReceiptValidationUseCase<S, A>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    A: ReceiptValidationRepository + Send + Sync + 'static,
{
    subscription_repo: Arc<S>,
    audit_repo: Arc<A>,
    catalog: Arc<ProductCatalog>,
    providers: Arc<ProviderRegistry>,
}

impl<S, A> ReceiptValidationUseCase<S, A>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    A: ReceiptValidationRepository + Send + Sync + 'static,
{
    pub fn new(
        subscription_repo: Arc<S>,
        audit_repo: Arc<A>,
        catalog: Arc<ProductCatalog>,
        providers: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            subscription_repo,
            audit_repo,
            catalog,
            providers,
        }
    }

    pub async fn validate_and_activate(
        &self,
        user_id: Uuid,
        provider: PaymentProvider,
        raw_receipt: &str,
        product_id_hint: Option<String>,
    ) -> ValidationResult<SubscriptionDto> {
        info!(%user_id, %provider, "receipt_validation: validation requested");

        let receipt_hash = hash_receipt(raw_receipt);

        let Some(client) = self.providers.get(provider) else {
            warn!(%user_id, %provider, "receipt_validation: provider client not configured");
            self.record_failure(
                user_id,
                provider,
                &receipt_hash,
                product_id_hint.as_deref(),
                None,
                "config: provider client not configured",
            )
            .await;
            return Err(ValidationError::ProviderUnavailable);
        };

        let receipt_info = match client.verify(raw_receipt, product_id_hint.clone()).await {
            Ok(VerifyOutcome::Valid(receipt_info)) => receipt_info,
            Ok(VerifyOutcome::Invalid { reason }) => {
                warn!(
                    %user_id,
                    %provider,
                    reason = %reason,
                    "receipt_validation: receipt rejected by provider"
                );
                self.record_failure(
                    user_id,
                    provider,
                    &receipt_hash,
                    product_id_hint.as_deref(),
                    None,
                    &format!("invalid: {}", reason),
                )
                .await;
                return Err(ValidationError::ReceiptRejected);
            }
            Err(err) => {
                error!(
                    %user_id,
                    %provider,
                    error = ?err,
                    "receipt_validation: provider verification failed"
                );
                self.record_failure(
                    user_id,
                    provider,
                    &receipt_hash,
                    product_id_hint.as_deref(),
                    None,
                    &format!("{}: {}", err.category(), err),
                )
                .await;
                return Err(ValidationError::ProviderUnavailable);
            }
        };

        let Some(product_id) = receipt_info.product_id.clone().or(product_id_hint) else {
            warn!(%user_id, %provider, "receipt_validation: product id missing");
            self.record_failure(
                user_id,
                provider,
                &receipt_hash,
                None,
                Some(&receipt_info.transaction_id),
                "invalid: product id missing from receipt and request",
            )
            .await;
            return Err(ValidationError::ReceiptRejected);
        };

        // An entitlement cannot be granted for a plan the system does not
        // recognize; an unknown SKU is a rejection, not an error.
        let Some(catalog_entry) = self.catalog.lookup(&product_id) else {
            warn!(
                %user_id,
                %provider,
                product_id = %product_id,
                "receipt_validation: unknown product id"
            );
            self.record_failure(
                user_id,
                provider,
                &receipt_hash,
                Some(&product_id),
                Some(&receipt_info.transaction_id),
                "invalid: unknown product id",
            )
            .await;
            return Err(ValidationError::ReceiptRejected);
        };

        if catalog_entry.provider != provider {
            warn!(
                %user_id,
                %provider,
                product_id = %product_id,
                catalog_provider = %catalog_entry.provider,
                "receipt_validation: product id belongs to another provider"
            );
            self.record_failure(
                user_id,
                provider,
                &receipt_hash,
                Some(&product_id),
                Some(&receipt_info.transaction_id),
                "invalid: product id belongs to another provider",
            )
            .await;
            return Err(ValidationError::ReceiptRejected);
        }

        let now = Utc::now();
        let status = if receipt_info.expires_date > now {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Expired
        };
        // Absent renewal intent resolves to false rather than carrying a
        // previously stored value; the upsert stays one declarative
        // statement.
        let auto_renew = receipt_info.auto_renew.unwrap_or(false);

        let upsert = UpsertSubscriptionEntity {
            user_id,
            plan: catalog_entry.plan.to_string(),
            status: status.to_string(),
            provider: provider.to_string(),
            product_id: product_id.clone(),
            original_transaction_id: receipt_info.original_transaction_id.clone(),
            started_at: receipt_info.purchase_date,
            expires_at: receipt_info.expires_date,
            cancelled_at: None,
            latest_receipt: truncate_receipt(raw_receipt),
            price_minor: catalog_entry.price_minor,
            currency: catalog_entry.currency.clone(),
            auto_renew,
            created_at: now,
            updated_at: now,
        };
        let audit = InsertReceiptValidationEntity {
            // Filled with the row id inside the repository transaction.
            subscription_id: None,
            user_id,
            provider: provider.to_string(),
            product_id: Some(product_id.clone()),
            receipt_hash: receipt_hash.clone(),
            transaction_id: Some(receipt_info.transaction_id.clone()),
            is_valid: true,
            error_message: None,
            validated_at: now,
        };

        let (subscription, outcome) = self
            .subscription_repo
            .upsert_validated_purchase(upsert, audit)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    %provider,
                    db_error = ?err,
                    "receipt_validation: failed to persist validated purchase"
                );
                ValidationError::Internal(err)
            })?;

        info!(
            %user_id,
            %provider,
            subscription_id = %subscription.id,
            outcome = ?outcome,
            expires_at = %subscription.expires_at,
            is_trial = receipt_info.is_trial,
            "receipt_validation: purchase validated"
        );

        if let Ok(seen) = self.audit_repo.count_by_receipt_hash(&receipt_hash).await {
            if seen > 1 {
                debug!(
                    %user_id,
                    receipt_hash = %receipt_hash,
                    seen,
                    "receipt_validation: receipt submitted before"
                );
            }
        }

        Ok(SubscriptionDto::from(subscription))
    }

    async fn record_failure(
        &self,
        user_id: Uuid,
        provider: PaymentProvider,
        receipt_hash: &str,
        product_id: Option<&str>,
        transaction_id: Option<&str>,
        message: &str,
    ) {
        let entry = InsertReceiptValidationEntity {
            subscription_id: None,
            user_id,
            provider: provider.to_string(),
            product_id: product_id.map(str::to_string),
            receipt_hash: receipt_hash.to_string(),
            transaction_id: transaction_id.map(str::to_string),
            is_valid: false,
            error_message: Some(message.to_string()),
            validated_at: Utc::now(),
        };

        // Best effort: the audit trail must not turn a rejection into a 500.
        if let Err(err) = self.audit_repo.record_validation(entry).await {
            warn!(
                %user_id,
                db_error = ?err,
                "receipt_validation: failed to record failed validation"
            );
        }
    }
}

pub fn hash_receipt(raw_receipt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_receipt.as_bytes());
    hex::encode(hasher.finalize())
}

fn truncate_receipt(raw_receipt: &str) -> String {
    raw_receipt.chars().take(RETAINED_RECEIPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::{
        entities::subscriptions::SubscriptionEntity,
        repositories::{
            receipt_validations::MockReceiptValidationRepository,
            subscriptions::MockSubscriptionRepository,
        },
        value_objects::{receipts::ReceiptInfo, subscriptions::UpsertOutcome},
    };
    use providers::{MockReceiptClient, ReceiptClient, VerifyError};

    const APPLE_MONTHLY_SKU: &str = "com.safescan.premium.monthly";

    fn sample_receipt_info(auto_renew: Option<bool>) -> ReceiptInfo {
        let now = Utc::now();
        ReceiptInfo {
            product_id: Some(APPLE_MONTHLY_SKU.to_string()),
            transaction_id: "txn-2".to_string(),
            original_transaction_id: "txn-1".to_string(),
            purchase_date: now - Duration::days(1),
            expires_date: now + Duration::days(29),
            is_trial: false,
            auto_renew,
        }
    }

    fn sample_entity(user_id: Uuid, upsert: &UpsertSubscriptionEntity) -> SubscriptionEntity {
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id,
            plan: upsert.plan.clone(),
            status: upsert.status.clone(),
            provider: upsert.provider.clone(),
            product_id: upsert.product_id.clone(),
            original_transaction_id: upsert.original_transaction_id.clone(),
            started_at: upsert.started_at,
            expires_at: upsert.expires_at,
            cancelled_at: upsert.cancelled_at,
            latest_receipt: upsert.latest_receipt.clone(),
            price_minor: upsert.price_minor,
            currency: upsert.currency.clone(),
            auto_renew: upsert.auto_renew,
            created_at: upsert.created_at,
            updated_at: upsert.updated_at,
        }
    }

    fn apple_client_returning(
        result: impl Fn() -> Result<VerifyOutcome, VerifyError> + Send + 'static,
    ) -> Arc<dyn ReceiptClient> {
        let mut client = MockReceiptClient::new();
        client
            .expect_provider()
            .returning(|| PaymentProvider::Apple);
        client.expect_verify().returning(move |_, _| {
            let result = result();
            Box::pin(async move { result })
        });
        Arc::new(client)
    }

    fn registry_with_apple(client: Arc<dyn ReceiptClient>) -> Arc<ProviderRegistry> {
        Arc::new(ProviderRegistry::new(Some(client), None))
    }

    fn usecase(
        subscription_repo: MockSubscriptionRepository,
        audit_repo: MockReceiptValidationRepository,
        providers: Arc<ProviderRegistry>,
    ) -> ReceiptValidationUseCase<MockSubscriptionRepository, MockReceiptValidationRepository>
    {
        ReceiptValidationUseCase::new(
            Arc::new(subscription_repo),
            Arc::new(audit_repo),
            Arc::new(ProductCatalog::with_defaults()),
            providers,
        )
    }

    #[tokio::test]
    async fn fresh_purchase_creates_an_active_subscription() {
        let user_id = Uuid::new_v4();
        let receipt_info = sample_receipt_info(Some(true));

        let client = apple_client_returning({
            let receipt_info = receipt_info.clone();
            move || Ok(VerifyOutcome::Valid(receipt_info.clone()))
        });

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_upsert_validated_purchase()
            .withf(move |upsert, audit| {
                upsert.user_id == user_id
                    && upsert.plan == "monthly"
                    && upsert.status == "active"
                    && upsert.provider == "apple"
                    && upsert.original_transaction_id == "txn-1"
                    && upsert.auto_renew
                    && audit.is_valid
            })
            .returning(move |upsert, _| {
                let entity = sample_entity(user_id, &upsert);
                Box::pin(async move { Ok((entity, UpsertOutcome::Inserted)) })
            });

        let mut audit_repo = MockReceiptValidationRepository::new();
        audit_repo
            .expect_count_by_receipt_hash()
            .returning(|_| Box::pin(async { Ok(1) }));

        let usecase = usecase(subscription_repo, audit_repo, registry_with_apple(client));

        let subscription = usecase
            .validate_and_activate(user_id, PaymentProvider::Apple, "receipt-blob", None)
            .await
            .unwrap();

        assert_eq!(subscription.plan, "monthly");
        assert_eq!(subscription.status, "active");
        assert!(subscription.auto_renew);
    }

    #[tokio::test]
    async fn invalid_receipt_never_touches_subscriptions() {
        let user_id = Uuid::new_v4();

        let client = apple_client_returning(|| {
            Ok(VerifyOutcome::Invalid {
                reason: "apple verification status 21003".to_string(),
            })
        });

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_upsert_validated_purchase().never();

        let mut audit_repo = MockReceiptValidationRepository::new();
        audit_repo
            .expect_record_validation()
            .withf(|entry| {
                !entry.is_valid
                    && entry.subscription_id.is_none()
                    && entry
                        .error_message
                        .as_deref()
                        .is_some_and(|message| message.starts_with("invalid:"))
            })
            .returning(|_| Box::pin(async { Ok(Uuid::new_v4()) }));

        let usecase = usecase(subscription_repo, audit_repo, registry_with_apple(client));

        let result = usecase
            .validate_and_activate(user_id, PaymentProvider::Apple, "stale-receipt", None)
            .await;

        assert!(matches!(result, Err(ValidationError::ReceiptRejected)));
    }

    #[tokio::test]
    async fn transport_failure_is_reported_as_transient() {
        let user_id = Uuid::new_v4();

        let client = apple_client_returning(|| {
            Err(VerifyError::Provider(
                "apple verify endpoint returned http status 503".to_string(),
            ))
        });

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_upsert_validated_purchase().never();

        let mut audit_repo = MockReceiptValidationRepository::new();
        audit_repo
            .expect_record_validation()
            .withf(|entry| {
                !entry.is_valid
                    && entry
                        .error_message
                        .as_deref()
                        .is_some_and(|message| message.starts_with("transient:"))
            })
            .returning(|_| Box::pin(async { Ok(Uuid::new_v4()) }));

        let usecase = usecase(subscription_repo, audit_repo, registry_with_apple(client));

        let result = usecase
            .validate_and_activate(user_id, PaymentProvider::Apple, "receipt-blob", None)
            .await;

        assert!(matches!(result, Err(ValidationError::ProviderUnavailable)));
    }

    #[tokio::test]
    async fn unknown_product_id_is_rejected_without_a_subscription() {
        let user_id = Uuid::new_v4();
        let mut receipt_info = sample_receipt_info(Some(true));
        receipt_info.product_id = Some("com.safescan.lifetime".to_string());

        let client = apple_client_returning({
            let receipt_info = receipt_info.clone();
            move || Ok(VerifyOutcome::Valid(receipt_info.clone()))
        });

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_upsert_validated_purchase().never();

        let mut audit_repo = MockReceiptValidationRepository::new();
        audit_repo
            .expect_record_validation()
            .withf(|entry| {
                !entry.is_valid
                    && entry.product_id.as_deref() == Some("com.safescan.lifetime")
                    && entry.error_message.as_deref() == Some("invalid: unknown product id")
            })
            .returning(|_| Box::pin(async { Ok(Uuid::new_v4()) }));

        let usecase = usecase(subscription_repo, audit_repo, registry_with_apple(client));

        let result = usecase
            .validate_and_activate(user_id, PaymentProvider::Apple, "receipt-blob", None)
            .await;

        assert!(matches!(result, Err(ValidationError::ReceiptRejected)));
    }

    #[tokio::test]
    async fn product_id_from_another_provider_is_rejected() {
        let user_id = Uuid::new_v4();
        let mut receipt_info = sample_receipt_info(Some(true));
        receipt_info.product_id = Some("safescan_premium_monthly".to_string());

        let client = apple_client_returning({
            let receipt_info = receipt_info.clone();
            move || Ok(VerifyOutcome::Valid(receipt_info.clone()))
        });

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_upsert_validated_purchase().never();

        let mut audit_repo = MockReceiptValidationRepository::new();
        audit_repo
            .expect_record_validation()
            .withf(|entry| {
                entry.error_message.as_deref()
                    == Some("invalid: product id belongs to another provider")
            })
            .returning(|_| Box::pin(async { Ok(Uuid::new_v4()) }));

        let usecase = usecase(subscription_repo, audit_repo, registry_with_apple(client));

        let result = usecase
            .validate_and_activate(user_id, PaymentProvider::Apple, "receipt-blob", None)
            .await;

        assert!(matches!(result, Err(ValidationError::ReceiptRejected)));
    }

    #[tokio::test]
    async fn absent_renewal_intent_defaults_to_false() {
        let user_id = Uuid::new_v4();
        let receipt_info = sample_receipt_info(None);

        let client = apple_client_returning({
            let receipt_info = receipt_info.clone();
            move || Ok(VerifyOutcome::Valid(receipt_info.clone()))
        });

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_upsert_validated_purchase()
            .withf(|upsert, _| !upsert.auto_renew)
            .returning(move |upsert, _| {
                let entity = sample_entity(user_id, &upsert);
                Box::pin(async move { Ok((entity, UpsertOutcome::Inserted)) })
            });

        let mut audit_repo = MockReceiptValidationRepository::new();
        audit_repo
            .expect_count_by_receipt_hash()
            .returning(|_| Box::pin(async { Ok(1) }));

        let usecase = usecase(subscription_repo, audit_repo, registry_with_apple(client));

        let subscription = usecase
            .validate_and_activate(user_id, PaymentProvider::Apple, "receipt-blob", None)
            .await
            .unwrap();

        assert!(!subscription.auto_renew);
    }

    #[tokio::test]
    async fn already_expired_receipt_is_stored_as_expired() {
        let user_id = Uuid::new_v4();
        let mut receipt_info = sample_receipt_info(Some(false));
        receipt_info.expires_date = Utc::now() - Duration::days(2);

        let client = apple_client_returning({
            let receipt_info = receipt_info.clone();
            move || Ok(VerifyOutcome::Valid(receipt_info.clone()))
        });

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_upsert_validated_purchase()
            .withf(|upsert, _| upsert.status == "expired")
            .returning(move |upsert, _| {
                let entity = sample_entity(user_id, &upsert);
                Box::pin(async move { Ok((entity, UpsertOutcome::Updated)) })
            });

        let mut audit_repo = MockReceiptValidationRepository::new();
        audit_repo
            .expect_count_by_receipt_hash()
            .returning(|_| Box::pin(async { Ok(2) }));

        let usecase = usecase(subscription_repo, audit_repo, registry_with_apple(client));

        let subscription = usecase
            .validate_and_activate(user_id, PaymentProvider::Apple, "receipt-blob", None)
            .await
            .unwrap();

        assert_eq!(subscription.status, "expired");
    }

    #[tokio::test]
    async fn unconfigured_provider_is_unavailable() {
        let user_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_upsert_validated_purchase().never();

        let mut audit_repo = MockReceiptValidationRepository::new();
        audit_repo
            .expect_record_validation()
            .withf(|entry| {
                entry
                    .error_message
                    .as_deref()
                    .is_some_and(|message| message.starts_with("config:"))
            })
            .returning(|_| Box::pin(async { Ok(Uuid::new_v4()) }));

        // Registry with no google client, the way a dev environment without
        // Play credentials comes up.
        let providers = Arc::new(ProviderRegistry::new(None, None));
        let usecase = usecase(subscription_repo, audit_repo, providers);

        let result = usecase
            .validate_and_activate(
                user_id,
                PaymentProvider::Google,
                "purchase-token",
                Some("safescan_premium_monthly".to_string()),
            )
            .await;

        assert!(matches!(result, Err(ValidationError::ProviderUnavailable)));
    }
}
