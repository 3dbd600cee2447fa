//! Unclaimed-premium sweep policy and settings

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What to do with premiums a provider has left untouched past the age
/// threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPolicy {
    /// Redistribute to providers currently holding principal in the asset
    RedistributeToActive,
    /// Forward to the fallback treasury account
    ForwardToTreasury,
}

/// Sweep configuration, chosen externally and fixed at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSettings {
    /// Idle time after which unclaimed premiums become sweepable
    /// (milliseconds since the provider's last premium activity)
    pub age_threshold_ms: i64,
    pub policy: SweepPolicy,
    /// Treasury account label used by the forward path
    pub treasury_account: String,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            // 90 days
            age_threshold_ms: 90 * 24 * 60 * 60 * 1000,
            policy: SweepPolicy::RedistributeToActive,
            treasury_account: "treasury".to_string(),
        }
    }
}

/// Result of one sweep pass over an asset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Providers whose premium balances were swept
    pub providers_swept: usize,
    /// Total premium amount taken
    pub total_swept: Decimal,
    /// Portion redistributed to active providers
    pub redistributed: Decimal,
    /// Portion forwarded to the treasury account
    pub forwarded: Decimal,
}
