use crate::auth::AuthUser;
use crate::usecases::{
    entitlements::EntitlementUseCase, receipt_validation::ReceiptValidationUseCase,
};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use domain::{
    repositories::{
        receipt_validations::ReceiptValidationRepository, subscriptions::SubscriptionRepository,
    },
    value_objects::{
        enums::payment_providers::PaymentProvider,
        product_catalog::ProductCatalog,
        subscriptions::{
            CancelSubscriptionResponse, ValidateReceiptRequest, ValidateReceiptResponse,
        },
    },
};
use infra::db::{
    postgres::postgres_connection::PgPoolSquad,
    repositories::{
        receipt_validations::ReceiptValidationPostgres, subscriptions::SubscriptionPostgres,
    },
};
use providers::ProviderRegistry;
use serde_json::json;
use std::sync::Arc;

pub struct SubscriptionsState<S, A>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    A: ReceiptValidationRepository + Send + Sync + 'static,
{
    pub validation: ReceiptValidationUseCase<S, A>,
    pub entitlements: EntitlementUseCase<S>,
}

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    catalog: Arc<ProductCatalog>,
    provider_registry: Arc<ProviderRegistry>,
) -> Router {
    let subscription_repo = Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool)));
    let audit_repo = Arc::new(ReceiptValidationPostgres::new(Arc::clone(&db_pool)));

    let validation = ReceiptValidationUseCase::new(
        Arc::clone(&subscription_repo),
        audit_repo,
        catalog,
        provider_registry,
    );
    let entitlements = EntitlementUseCase::new(subscription_repo);

    Router::new()
        .route("/validate", post(validate_receipt))
        .route("/active", get(check_active))
        .route("/status", get(get_status))
        .route("/cancel", post(cancel_subscription))
        .with_state(Arc::new(SubscriptionsState {
            validation,
            entitlements,
        }))
}

pub async fn validate_receipt<S, A>(
    State(state): State<Arc<SubscriptionsState<S, A>>>,
    auth: AuthUser,
    Json(request): Json<ValidateReceiptRequest>,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync,
    A: ReceiptValidationRepository + Send + Sync,
{
    let Some(provider) = PaymentProvider::from_str(&request.provider) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ValidateReceiptResponse {
                success: false,
                subscription: None,
                error: Some("unknown provider".to_string()),
            }),
        )
            .into_response();
    };

    match state
        .validation
        .validate_and_activate(
            auth.user_id,
            provider,
            &request.receipt,
            request.product_id.clone(),
        )
        .await
    {
        Ok(subscription) => (
            StatusCode::OK,
            Json(ValidateReceiptResponse {
                success: true,
                subscription: Some(subscription),
                error: None,
            }),
        )
            .into_response(),
        Err(err) => (
            err.status_code(),
            Json(ValidateReceiptResponse {
                success: false,
                subscription: None,
                error: Some(err.public_message().to_string()),
            }),
        )
            .into_response(),
    }
}

pub async fn check_active<S, A>(
    State(state): State<Arc<SubscriptionsState<S, A>>>,
    auth: AuthUser,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync,
    A: ReceiptValidationRepository + Send + Sync,
{
    match state.entitlements.is_active(auth.user_id).await {
        Ok(active) => (StatusCode::OK, Json(json!({ "active": active }))).into_response(),
        Err(err) => (
            err.status_code(),
            Json(json!({ "error": "failed to check subscription" })),
        )
            .into_response(),
    }
}

pub async fn get_status<S, A>(
    State(state): State<Arc<SubscriptionsState<S, A>>>,
    auth: AuthUser,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync,
    A: ReceiptValidationRepository + Send + Sync,
{
    match state.entitlements.get_status(auth.user_id).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(err) => (
            err.status_code(),
            Json(json!({ "error": "failed to load subscription status" })),
        )
            .into_response(),
    }
}

pub async fn cancel_subscription<S, A>(
    State(state): State<Arc<SubscriptionsState<S, A>>>,
    auth: AuthUser,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync,
    A: ReceiptValidationRepository + Send + Sync,
{
    match state.entitlements.cancel(auth.user_id).await {
        Ok(expires_at) => (
            StatusCode::OK,
            Json(CancelSubscriptionResponse {
                success: true,
                expires_at: Some(expires_at),
            }),
        )
            .into_response(),
        Err(err) => (
            err.status_code(),
            Json(CancelSubscriptionResponse {
                success: false,
                expires_at: None,
            }),
        )
            .into_response(),
    }
}
