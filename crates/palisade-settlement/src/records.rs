//! Settlement records and per-provider impact entries

use palisade_allocation::TierSnapshot;
use palisade_common::{AssetId, BlockHeight, PolicyId, ProviderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Terminal record of a settled policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub policy: PolicyId,
    pub asset: AssetId,
    /// Policy owner the settlement amount was transferred to
    pub owner: String,
    /// Settlement amount requested by the caller
    pub amount: Decimal,
    /// Block height at which the settlement was processed
    pub height: BlockHeight,
    /// Collateral left over across contributors after their shares were
    /// deducted; released back to the providers
    pub remaining_collateral: Decimal,
    /// Portion of the amount that could not be collected because every
    /// contributor able to cover it had dropped out
    pub unrecoverable: Decimal,
    /// Processing timestamp (Unix millis)
    pub settled_at: i64,
}

/// Audit entry for one provider's contribution to a settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementImpact {
    pub provider: ProviderId,
    pub policy: PolicyId,
    /// Amount deducted from this provider's allocated collateral
    pub share: Decimal,
    /// Collateral the provider had allocated to the policy
    pub allocated: Decimal,
    /// The provider's fraction of the policy's total collateral at
    /// settlement time, in basis points
    pub allocation_bps: Decimal,
    /// Tier terms the collateral was locked under
    pub tier: TierSnapshot,
}
