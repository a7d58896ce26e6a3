use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value_objects::enums::{
    payment_providers::PaymentProvider, subscription_plans::SubscriptionPlan,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub product_id: String,
    pub provider: PaymentProvider,
    pub plan: SubscriptionPlan,
    pub price_minor: i32,
    pub currency: String,
}

/// Static SKU table mapping provider product identifiers to an internal
/// plan. Built once at startup and shared by `Arc`; an unknown product id
/// is a lookup miss, not an error.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl ProductCatalog {
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.product_id.clone(), entry))
                .collect(),
        }
    }

    /// The SKUs live in both stores today.
    pub fn with_defaults() -> Self {
        Self::from_entries(vec![
            CatalogEntry {
                product_id: "com.safescan.premium.monthly".to_string(),
                provider: PaymentProvider::Apple,
                plan: SubscriptionPlan::Monthly,
                price_minor: 499,
                currency: "USD".to_string(),
            },
            CatalogEntry {
                product_id: "com.safescan.premium.annual".to_string(),
                provider: PaymentProvider::Apple,
                plan: SubscriptionPlan::Annual,
                price_minor: 3999,
                currency: "USD".to_string(),
            },
            CatalogEntry {
                product_id: "safescan_premium_monthly".to_string(),
                provider: PaymentProvider::Google,
                plan: SubscriptionPlan::Monthly,
                price_minor: 499,
                currency: "USD".to_string(),
            },
            CatalogEntry {
                product_id: "safescan_premium_annual".to_string(),
                provider: PaymentProvider::Google,
                plan: SubscriptionPlan::Annual,
                price_minor: 3999,
                currency: "USD".to_string(),
            },
        ])
    }

    pub fn lookup(&self, product_id: &str) -> Option<&CatalogEntry> {
        self.entries.get(product_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
