pub mod entitlements;
pub mod receipt_validation;
