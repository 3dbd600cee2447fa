//! Allocation records and the expiration liquidity table

use std::collections::HashMap;

use palisade_common::{AssetId, BlockHeight, PolicyId, ProviderId, TierName};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tier parameters captured at lock time
///
/// Settlement and premium distribution read the snapshot, not the live
/// catalog, so a tier parameter change mid-policy cannot alter the terms
/// collateral was committed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSnapshot {
    pub name: TierName,
    pub collateral_ratio_bps: i64,
    pub premium_multiplier_bps: u32,
    pub max_exposure_bps: u32,
}

/// One provider's collateral committed to one policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyAllocation {
    pub provider: ProviderId,
    pub policy: PolicyId,
    pub asset: AssetId,
    /// Collateral locked by this provider
    pub amount: Decimal,
    /// Tier terms at lock time
    pub tier: TierSnapshot,
    /// Height at which the policy matures
    pub expiration: BlockHeight,
    /// Lock timestamp (Unix millis)
    pub locked_at: i64,
}

/// A policy's collateral lock: the requested terms plus the per-provider
/// allocation records
///
/// The tier here is the one named in the lock request, which may be a
/// buyer-facing tier matched against provider tiers by compatibility; each
/// allocation record carries the backing provider's own tier snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyLock {
    pub policy: PolicyId,
    pub asset: AssetId,
    pub tier: TierName,
    pub expiration: BlockHeight,
    /// Policy owner, as reported by the policy lifecycle service
    pub owner: String,
    /// Total collateral locked, equal to the sum of the allocations
    pub total: Decimal,
    pub allocations: Vec<PolicyAllocation>,
}

/// Aggregate collateral requirement maturing at one expiration height
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpirationNeed {
    /// Total collateral required across all assets and tiers
    pub total_required: Decimal,
    /// Whether liquidity has been prepared for this height
    pub prepared: bool,
    /// Number of policies maturing at this height
    pub policy_count: u64,
}

/// Per-expiration liquidity requirements
///
/// The asset and asset × tier breakdowns are one flat table keyed by the
/// composite `(expiration, asset, tier)` tuple; the per-asset view is the
/// sum over tiers. Decrements clamp at zero, and a need record is created
/// lazily on the first allocation (or preparation) targeting its height.
#[derive(Debug, Default)]
pub struct LiquidityTable {
    needs: HashMap<BlockHeight, ExpirationNeed>,
    rows: HashMap<(BlockHeight, AssetId, TierName), Decimal>,
}

impl LiquidityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a policy's collateral requirement at its expiration
    pub fn add(
        &mut self,
        expiration: BlockHeight,
        asset: &AssetId,
        tier: &TierName,
        amount: Decimal,
    ) {
        let need = self.needs.entry(expiration).or_default();
        need.total_required += amount;
        need.policy_count += 1;

        *self
            .rows
            .entry((expiration, asset.clone(), tier.clone()))
            .or_default() += amount;
    }

    /// Remove a concluded policy's requirement, clamping at zero
    pub fn sub(
        &mut self,
        expiration: BlockHeight,
        asset: &AssetId,
        tier: &TierName,
        amount: Decimal,
    ) {
        if let Some(need) = self.needs.get_mut(&expiration) {
            need.total_required = (need.total_required - amount).max(Decimal::ZERO);
            need.policy_count = need.policy_count.saturating_sub(1);
        }
        if let Some(row) = self.rows.get_mut(&(expiration, asset.clone(), tier.clone())) {
            *row = (*row - amount).max(Decimal::ZERO);
        }
    }

    /// Idempotently mark a height as prepared, creating an empty record if
    /// none exists yet. Returns true on the first transition.
    pub fn prepare(&mut self, expiration: BlockHeight) -> bool {
        let need = self.needs.entry(expiration).or_default();
        let newly = !need.prepared;
        need.prepared = true;
        newly
    }

    /// Aggregate requirement at a height, if any allocation or preparation
    /// has targeted it
    pub fn need(&self, expiration: BlockHeight) -> Option<&ExpirationNeed> {
        self.needs.get(&expiration)
    }

    /// Requirement at a height for one asset (summed over tiers)
    pub fn asset_requirement(&self, expiration: BlockHeight, asset: &AssetId) -> Decimal {
        self.rows
            .iter()
            .filter(|((h, a, _), _)| *h == expiration && a == asset)
            .map(|(_, amount)| *amount)
            .sum()
    }

    /// Requirement at a height for one asset × tier row
    pub fn tier_requirement(
        &self,
        expiration: BlockHeight,
        asset: &AssetId,
        tier: &TierName,
    ) -> Decimal {
        self.rows
            .get(&(expiration, asset.clone(), tier.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ustx() -> AssetId {
        AssetId::from("uSTX")
    }

    fn balanced() -> TierName {
        TierName::from("balanced")
    }

    #[test]
    fn test_add_and_breakdowns() {
        let mut table = LiquidityTable::new();
        table.add(100, &ustx(), &balanced(), dec!(1500));
        table.add(100, &ustx(), &TierName::from("aggressive"), dec!(500));
        table.add(200, &ustx(), &balanced(), dec!(300));

        let need = table.need(100).unwrap();
        assert_eq!(need.total_required, dec!(2000));
        assert_eq!(need.policy_count, 2);

        assert_eq!(table.asset_requirement(100, &ustx()), dec!(2000));
        assert_eq!(table.tier_requirement(100, &ustx(), &balanced()), dec!(1500));
        assert_eq!(table.asset_requirement(200, &ustx()), dec!(300));
    }

    #[test]
    fn test_sub_clamps_at_zero() {
        let mut table = LiquidityTable::new();
        table.add(100, &ustx(), &balanced(), dec!(500));
        table.sub(100, &ustx(), &balanced(), dec!(800));

        let need = table.need(100).unwrap();
        assert_eq!(need.total_required, dec!(0));
        assert_eq!(need.policy_count, 0);
        assert_eq!(table.tier_requirement(100, &ustx(), &balanced()), dec!(0));

        // Subtracting against an unknown height is a no-op
        table.sub(999, &ustx(), &balanced(), dec!(1));
        assert!(table.need(999).is_none());
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let mut table = LiquidityTable::new();
        assert!(table.prepare(100));
        assert!(!table.prepare(100));

        let need = table.need(100).unwrap();
        assert!(need.prepared);
        assert_eq!(need.total_required, dec!(0));
    }

    #[test]
    fn test_prepare_preserves_existing_need() {
        let mut table = LiquidityTable::new();
        table.add(100, &ustx(), &balanced(), dec!(750));
        table.prepare(100);

        let need = table.need(100).unwrap();
        assert!(need.prepared);
        assert_eq!(need.total_required, dec!(750));
    }
}
