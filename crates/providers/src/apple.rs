use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use domain::value_objects::{enums::payment_providers::PaymentProvider, receipts::ReceiptInfo};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::{ReceiptClient, VerifyError, VerifyOutcome, parse_epoch_millis};

const PRODUCTION_URL: &str = "https://buy.itunes.apple.com/verifyReceipt";
const SANDBOX_URL: &str = "https://sandbox.itunes.apple.com/verifyReceipt";
const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Receipts occasionally arrive in the environment they were not issued
/// for; the endpoint signals this instead of validating. One retry against
/// the alternate endpoint is the documented recovery, never a loop.
const STATUS_SANDBOX_RECEIPT_AT_PRODUCTION: i64 = 21007;
const STATUS_PRODUCTION_RECEIPT_AT_SANDBOX: i64 = 21008;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppleEnvironment {
    Production,
    Sandbox,
}

/// App Store verify-receipt client. https://developer.apple.com/documentation/appstorereceipts/verifyreceipt
pub struct AppleReceiptClient {
    http: reqwest::Client,
    shared_secret: String,
    primary: AppleEnvironment,
}

#[derive(Debug, Deserialize)]
pub struct AppleVerifyResponse {
    pub status: i64,
    #[serde(default)]
    pub latest_receipt_info: Vec<AppleLatestReceiptInfo>,
    #[serde(default)]
    pub pending_renewal_info: Vec<ApplePendingRenewalInfo>,
}

/// Apple serializes timestamps and booleans as strings in this payload.
#[derive(Debug, Deserialize)]
pub struct AppleLatestReceiptInfo {
    pub product_id: Option<String>,
    pub transaction_id: Option<String>,
    pub original_transaction_id: Option<String>,
    pub purchase_date_ms: Option<String>,
    pub expires_date_ms: Option<String>,
    pub is_trial_period: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApplePendingRenewalInfo {
    pub product_id: Option<String>,
    pub auto_renew_status: Option<String>,
}

impl AppleReceiptClient {
    pub fn new(shared_secret: String, primary: AppleEnvironment) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(VERIFY_TIMEOUT).build()?;
        Ok(Self {
            http,
            shared_secret,
            primary,
        })
    }

    fn endpoints(&self) -> (&'static str, &'static str) {
        match self.primary {
            AppleEnvironment::Production => (PRODUCTION_URL, SANDBOX_URL),
            AppleEnvironment::Sandbox => (SANDBOX_URL, PRODUCTION_URL),
        }
    }

    async fn call_verify(
        &self,
        url: &str,
        raw_receipt: &str,
    ) -> Result<AppleVerifyResponse, VerifyError> {
        let body = json!({
            "receipt-data": raw_receipt,
            "password": self.shared_secret,
            "exclude-old-transactions": true,
        });

        let resp = self.http.post(url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            error!(
                http_status = status.as_u16(),
                "apple_iap: verify endpoint request failed"
            );
            return Err(VerifyError::Provider(format!(
                "apple verify endpoint returned http status {}",
                status.as_u16()
            )));
        }

        Ok(resp.json::<AppleVerifyResponse>().await?)
    }
}

#[async_trait]
impl ReceiptClient for AppleReceiptClient {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Apple
    }

    async fn verify(
        &self,
        raw_receipt: &str,
        _product_id_hint: Option<String>,
    ) -> Result<VerifyOutcome, VerifyError> {
        let (primary, alternate) = self.endpoints();

        let mut response = self.call_verify(primary, raw_receipt).await?;
        if is_environment_mismatch(response.status) {
            warn!(
                status = response.status,
                "apple_iap: receipt from the other environment, retrying once against alternate endpoint"
            );
            response = self.call_verify(alternate, raw_receipt).await?;
        }

        if response.status != 0 {
            warn!(
                status = response.status,
                "apple_iap: receipt rejected by verification endpoint"
            );
            return Ok(VerifyOutcome::Invalid {
                reason: format!("apple verification status {}", response.status),
            });
        }

        Ok(receipt_info_from_response(&response))
    }
}

pub(crate) fn is_environment_mismatch(status: i64) -> bool {
    status == STATUS_SANDBOX_RECEIPT_AT_PRODUCTION || status == STATUS_PRODUCTION_RECEIPT_AT_SANDBOX
}

/// Normalizes a successful verify response. The transaction history is
/// ordered oldest-first; the last entry is the most recent renewal.
pub(crate) fn receipt_info_from_response(response: &AppleVerifyResponse) -> VerifyOutcome {
    let Some(latest) = response.latest_receipt_info.last() else {
        return VerifyOutcome::Invalid {
            reason: "receipt carries no transactions".to_string(),
        };
    };

    let Some(transaction_id) = latest.transaction_id.clone() else {
        return VerifyOutcome::Invalid {
            reason: "transaction id missing from receipt".to_string(),
        };
    };
    let original_transaction_id = latest
        .original_transaction_id
        .clone()
        .unwrap_or_else(|| transaction_id.clone());

    let Some(expires_date) = latest.expires_date_ms.as_deref().and_then(parse_epoch_millis)
    else {
        return VerifyOutcome::Invalid {
            reason: "expiry date missing from receipt".to_string(),
        };
    };
    let Some(purchase_date) = latest
        .purchase_date_ms
        .as_deref()
        .and_then(parse_epoch_millis)
    else {
        return VerifyOutcome::Invalid {
            reason: "purchase date missing from receipt".to_string(),
        };
    };

    // Renewal intent lives in a separate section keyed by product id and
    // may be absent entirely; absence is reported as None, not false.
    let auto_renew = response
        .pending_renewal_info
        .iter()
        .find(|info| info.product_id == latest.product_id)
        .or_else(|| response.pending_renewal_info.first())
        .and_then(|info| info.auto_renew_status.as_deref())
        .map(|status| status == "1");

    VerifyOutcome::Valid(ReceiptInfo {
        product_id: latest.product_id.clone(),
        transaction_id,
        original_transaction_id,
        purchase_date,
        expires_date,
        is_trial: latest.is_trial_period.as_deref() == Some("true"),
        auto_renew,
    })
}
