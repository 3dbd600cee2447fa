//! Risk tier parameter sets

use palisade_common::TierName;
use serde::{Deserialize, Serialize};

/// Whether a tier is selected by protection buyers or capital providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    /// Buyer-facing tier (selected when purchasing protection)
    Buyer,
    /// Provider-facing tier (selected when depositing capital)
    Provider,
}

/// Externally-configured parameters of one risk tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskTierParams {
    /// Tier name
    pub name: TierName,

    /// Buyer-facing or provider-facing
    pub kind: TierKind,

    /// Collateral ratio in basis points (15_000 = 150% of the protected
    /// amount). Signed so a misconfigured non-positive ratio can be
    /// detected and rejected rather than silently clamped.
    pub collateral_ratio_bps: i64,

    /// Premium-adjustment weight in basis points (10_000 = 1.0x). Higher
    /// tiers earn a larger premium share for equal collateral.
    pub premium_multiplier_bps: u32,

    /// Maximum share of a provider's deposited balance that may be exposed
    /// at a single expiration height, in basis points
    pub max_exposure_bps: u32,

    /// Whether the tier currently accepts new allocations
    pub active: bool,

    /// For buyer tiers: the protection level the buyer requires
    pub protection_level: u16,

    /// For provider tiers: the highest protection level the provider is
    /// willing to back
    pub risk_tolerance: u16,
}

impl RiskTierParams {
    /// Compatibility rule: a provider tier can back a buyer tier only if
    /// both tiers are active, the kinds are correct for their roles, and
    /// the provider's risk tolerance covers the buyer's required
    /// protection level.
    pub fn accepts(buyer: &RiskTierParams, provider: &RiskTierParams) -> bool {
        buyer.active
            && provider.active
            && buyer.kind == TierKind::Buyer
            && provider.kind == TierKind::Provider
            && provider.risk_tolerance >= buyer.protection_level
    }
}
