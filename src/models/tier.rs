//! # Subscription Tier
//!
//! The submitting user's subscription level as reported by the billing layer.
//! Tiers are the primary input to lane selection and dequeue priority.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Priority served first (unlimited plans)
pub const PRIORITY_MAXIMUM: u8 = 1;
/// Priority for the remaining premium plans
pub const PRIORITY_PREMIUM: u8 = 2;
/// Priority for everything else
pub const PRIORITY_STANDARD: u8 = 3;

/// Subscription tier of the user submitting a job
///
/// Billing sends tiers as free-form strings. Known values parse
/// case-insensitively; anything else is kept verbatim in [`SubscriptionTier::Other`]
/// and scheduled like a free plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionTier {
    Free,
    Basic,
    Pro,
    Enterprise,
    Unlimited,
    /// Legacy spelling of `Unlimited` still present on older accounts
    Ilimitado,
    Other(String),
}

impl SubscriptionTier {
    /// Tiers that are routed to the premium lane
    pub fn is_premium(&self) -> bool {
        matches!(
            self,
            SubscriptionTier::Pro
                | SubscriptionTier::Enterprise
                | SubscriptionTier::Unlimited
                | SubscriptionTier::Ilimitado
        )
    }

    /// Dequeue priority for this tier, lower is served first
    pub fn priority(&self) -> u8 {
        match self {
            SubscriptionTier::Unlimited | SubscriptionTier::Ilimitado => PRIORITY_MAXIMUM,
            SubscriptionTier::Pro | SubscriptionTier::Enterprise => PRIORITY_PREMIUM,
            _ => PRIORITY_STANDARD,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Enterprise => "enterprise",
            SubscriptionTier::Unlimited => "unlimited",
            SubscriptionTier::Ilimitado => "ilimitado",
            SubscriptionTier::Other(name) => name.as_str(),
        }
    }
}

impl From<&str> for SubscriptionTier {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => SubscriptionTier::Free,
            "basic" => SubscriptionTier::Basic,
            "pro" => SubscriptionTier::Pro,
            "enterprise" => SubscriptionTier::Enterprise,
            "unlimited" => SubscriptionTier::Unlimited,
            "ilimitado" => SubscriptionTier::Ilimitado,
            _ => SubscriptionTier::Other(value.to_string()),
        }
    }
}

impl From<String> for SubscriptionTier {
    fn from(value: String) -> Self {
        SubscriptionTier::from(value.as_str())
    }
}

impl From<SubscriptionTier> for String {
    fn from(tier: SubscriptionTier) -> Self {
        tier.as_str().to_string()
    }
}

impl FromStr for SubscriptionTier {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SubscriptionTier::from(s))
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
