pub mod payment_providers;
pub mod subscription_plans;
pub mod subscription_statuses;
