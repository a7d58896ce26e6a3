use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PaymentProvider {
    Apple,
    Google,
}

impl PaymentProvider {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "apple" => Some(PaymentProvider::Apple),
            "google" => Some(PaymentProvider::Google),
            _ => None,
        }
    }
}

impl Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let provider = match self {
            PaymentProvider::Apple => "apple",
            PaymentProvider::Google => "google",
        };
        write!(f, "{}", provider)
    }
}
