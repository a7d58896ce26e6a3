use crate::auth::AuthUser;
use crate::usecases::entitlements::EntitlementUseCase;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use domain::repositories::subscriptions::SubscriptionRepository;
use infra::db::{
    postgres::postgres_connection::PgPoolSquad, repositories::subscriptions::SubscriptionPostgres,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 3;

/// Cron/ops entry points: the scheduled sweep and the expiring-soon feed
/// for the notification service.
pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let subscription_repo = Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool)));
    let entitlements = EntitlementUseCase::new(subscription_repo);

    Router::new()
        .route("/cleanup-expired", post(cleanup_expired))
        .route("/expiring", get(expiring_soon))
        .route("/metrics", get(metrics))
        .with_state(Arc::new(entitlements))
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

pub async fn cleanup_expired<S>(
    State(entitlements): State<Arc<EntitlementUseCase<S>>>,
    _auth: AuthUser,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync,
{
    match entitlements.cleanup_expired_subscriptions().await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "swept": report.swept,
                "users_cleared": report.users_cleared,
            })),
        )
            .into_response(),
        Err(err) => (
            err.status_code(),
            Json(json!({ "error": "expiry sweep failed" })),
        )
            .into_response(),
    }
}

pub async fn expiring_soon<S>(
    State(entitlements): State<Arc<EntitlementUseCase<S>>>,
    _auth: AuthUser,
    Query(query): Query<ExpiringQuery>,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync,
{
    let days = query.days.unwrap_or(DEFAULT_EXPIRY_WINDOW_DAYS);

    match entitlements.expiring_soon(days).await {
        Ok(expiring) => (StatusCode::OK, Json(expiring)).into_response(),
        Err(err) => (
            err.status_code(),
            Json(json!({ "error": "failed to list expiring subscriptions" })),
        )
            .into_response(),
    }
}

pub async fn metrics<S>(
    State(entitlements): State<Arc<EntitlementUseCase<S>>>,
    _auth: AuthUser,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync,
{
    match entitlements.get_metrics().await {
        Ok(metrics) => (StatusCode::OK, Json(metrics)).into_response(),
        Err(err) => (
            err.status_code(),
            Json(json!({ "error": "failed to collect metrics" })),
        )
            .into_response(),
    }
}
