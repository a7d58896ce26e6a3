pub mod enums;
pub mod product_catalog;
pub mod receipts;
pub mod subscriptions;
