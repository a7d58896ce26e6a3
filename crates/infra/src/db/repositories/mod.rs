pub mod receipt_validations;
pub mod subscriptions;
