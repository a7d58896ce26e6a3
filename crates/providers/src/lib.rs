pub mod apple;
pub mod google;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use domain::value_objects::{enums::payment_providers::PaymentProvider, receipts::ReceiptInfo};
use mockall::automock;
use thiserror::Error;

/// Verdict of a verification call. Invalidity is an expected, frequent
/// outcome and therefore a value, never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Valid(ReceiptInfo),
    Invalid { reason: String },
}

/// Failures of the verification machinery itself, as opposed to the
/// provider saying "no". Transport and Provider are retryable; Config is
/// not.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned an unexpected response: {0}")]
    Provider(String),
    #[error("provider client misconfigured: {0}")]
    Config(String),
}

impl VerifyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, VerifyError::Transport(_) | VerifyError::Provider(_))
    }

    pub fn category(&self) -> &'static str {
        if self.is_transient() { "transient" } else { "config" }
    }
}

#[async_trait]
#[automock]
pub trait ReceiptClient: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    async fn verify(
        &self,
        raw_receipt: &str,
        product_id_hint: Option<String>,
    ) -> Result<VerifyOutcome, VerifyError>;
}

/// Provider dispatch keyed by the `PaymentProvider` enum. A `None` slot
/// means the client was soft-disabled at startup (missing credentials
/// outside production).
pub struct ProviderRegistry {
    apple: Option<Arc<dyn ReceiptClient>>,
    google: Option<Arc<dyn ReceiptClient>>,
}

impl ProviderRegistry {
    pub fn new(
        apple: Option<Arc<dyn ReceiptClient>>,
        google: Option<Arc<dyn ReceiptClient>>,
    ) -> Self {
        Self { apple, google }
    }

    pub fn get(&self, provider: PaymentProvider) -> Option<Arc<dyn ReceiptClient>> {
        match provider {
            PaymentProvider::Apple => self.apple.clone(),
            PaymentProvider::Google => self.google.clone(),
        }
    }
}

pub(crate) fn parse_epoch_millis(value: &str) -> Option<DateTime<Utc>> {
    value
        .parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}
