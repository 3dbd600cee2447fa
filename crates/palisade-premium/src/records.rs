//! Premium distribution records

use palisade_common::{AssetId, BlockHeight, PolicyId, ProviderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One policy's premium payment and its split across providers
///
/// Created once per policy at payment time with `distributed = false`;
/// distribution flips the flag and is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremiumRecord {
    pub policy: PolicyId,
    pub asset: AssetId,
    /// Premium paid by the policy buyer
    pub amount: Decimal,
    /// Policy expiration height
    pub expiration: BlockHeight,
    /// Policy owner who paid the premium
    pub owner: String,
    /// Per-provider premium shares, fixed at recording time
    pub shares: Vec<(ProviderId, Decimal)>,
    /// Whether the pending shares have been converted to earned balance
    pub distributed: bool,
    /// Recording timestamp (Unix millis)
    pub recorded_at: i64,
    /// Distribution timestamp (Unix millis), if distributed
    pub distributed_at: Option<i64>,
}
