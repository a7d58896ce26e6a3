pub mod app_users;
pub mod receipt_validations;
pub mod subscriptions;
