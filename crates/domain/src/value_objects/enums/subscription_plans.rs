use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum SubscriptionPlan {
    Monthly,
    Annual,
}

impl SubscriptionPlan {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "monthly" => Some(SubscriptionPlan::Monthly),
            "annual" => Some(SubscriptionPlan::Annual),
            _ => None,
        }
    }

    pub fn duration_days(&self) -> i64 {
        match self {
            SubscriptionPlan::Monthly => 30,
            SubscriptionPlan::Annual => 365,
        }
    }
}

impl Display for SubscriptionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plan = match self {
            SubscriptionPlan::Monthly => "monthly",
            SubscriptionPlan::Annual => "annual",
        };
        write!(f, "{}", plan)
    }
}
