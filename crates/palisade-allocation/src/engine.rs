//! Allocation engine
//!
//! Owns the policy -> provider allocation records, per-provider exposure
//! counters, and the expiration liquidity table. Balance mutations go
//! through the capital ledger; this engine decides who backs what.

use std::collections::HashMap;

use chrono::Utc;
use palisade_common::{
    apply_bps, AllocationError, AssetId, BlockHeight, EventOutbox, LedgerError, LedgerEvent,
    PolicyId, ProviderId, Result, TierName,
};
use palisade_ledger::CapitalLedger;
use palisade_tiers::{TierCatalog, TierKind};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::records::{ExpirationNeed, LiquidityTable, PolicyAllocation, PolicyLock, TierSnapshot};
use crate::strategy::{CandidateProvider, SelectionStrategy};

pub struct AllocationEngine {
    locks: HashMap<PolicyId, PolicyLock>,
    /// Collateral a provider has committed per asset per expiration height
    exposures: HashMap<(ProviderId, AssetId, BlockHeight), Decimal>,
    liquidity: LiquidityTable,
    strategy: Box<dyn SelectionStrategy>,
}

impl AllocationEngine {
    pub fn new(strategy: Box<dyn SelectionStrategy>) -> Self {
        Self {
            locks: HashMap::new(),
            exposures: HashMap::new(),
            liquidity: LiquidityTable::new(),
            strategy,
        }
    }

    /// Select providers and lock their collateral against a policy
    ///
    /// The tier may be provider-facing (candidates are providers deposited
    /// under exactly that tier) or buyer-facing (candidates are providers
    /// whose tier is compatible with it). All-or-nothing: every selected
    /// share is checked against the provider's available balance and
    /// exposure limit before any balance or record is mutated. A policy can
    /// hold at most one lock.
    #[allow(clippy::too_many_arguments)]
    pub fn lock_collateral(
        &mut self,
        ledger: &mut CapitalLedger,
        tiers: &TierCatalog,
        outbox: &EventOutbox,
        policy: &PolicyId,
        required: Decimal,
        asset: &AssetId,
        tier: &TierName,
        expiration: BlockHeight,
        owner: &str,
    ) -> Result<()> {
        if required <= Decimal::ZERO {
            return Err(AllocationError::InvalidAmount.into());
        }
        if self.locks.contains_key(policy) {
            return Err(AllocationError::AlreadyLocked(policy.clone()).into());
        }
        tiers.ensure_tier_active(tier)?;

        let (candidates, snapshots) =
            self.eligible_candidates(ledger, tiers, tier, asset, expiration)?;
        let shares = self.strategy.select(policy, required, &candidates)?;

        // Validate every share before touching anything
        for share in &shares {
            let balance = ledger.provider_balance(&share.provider, asset)?;
            if balance.available < share.amount {
                return Err(LedgerError::InsufficientBalance {
                    required: share.amount,
                    available: balance.available,
                }
                .into());
            }
            let snapshot = &snapshots[&share.provider];
            let limit = apply_bps(balance.deposited, snapshot.max_exposure_bps);
            let resulting = self.exposure(&share.provider, asset, expiration) + share.amount;
            if resulting > limit {
                return Err(AllocationError::ExposureLimitExceeded {
                    provider: share.provider.clone(),
                    expiration,
                    share: share.amount,
                    resulting,
                    limit,
                }
                .into());
            }
        }

        // Apply
        let now = Utc::now().timestamp_millis();
        let mut allocations = Vec::with_capacity(shares.len());
        for share in &shares {
            ledger.lock_collateral(&share.provider, asset, share.amount)?;
            *self
                .exposures
                .entry((share.provider.clone(), asset.clone(), expiration))
                .or_default() += share.amount;
            allocations.push(PolicyAllocation {
                provider: share.provider.clone(),
                policy: policy.clone(),
                asset: asset.clone(),
                amount: share.amount,
                tier: snapshots[&share.provider].clone(),
                expiration,
                locked_at: now,
            });
        }
        self.liquidity.add(expiration, asset, tier, required);
        self.locks.insert(
            policy.clone(),
            PolicyLock {
                policy: policy.clone(),
                asset: asset.clone(),
                tier: tier.clone(),
                expiration,
                owner: owner.to_string(),
                total: required,
                allocations,
            },
        );

        info!(
            policy = %policy,
            asset = %asset,
            tier = %tier,
            %required,
            providers = shares.len(),
            strategy = self.strategy.name(),
            "Collateral locked"
        );
        outbox.record(LedgerEvent::CollateralLocked {
            policy: policy.clone(),
            asset: asset.clone(),
            tier: tier.clone(),
            expiration,
            total: required,
            shares: shares
                .iter()
                .map(|s| (s.provider.clone(), s.amount))
                .collect(),
        });
        Ok(())
    }

    /// Return a concluded policy's collateral to its providers
    ///
    /// Used when the buyer's protection expired worthless. Returns the
    /// total amount released.
    pub fn release_collateral(
        &mut self,
        ledger: &mut CapitalLedger,
        outbox: &EventOutbox,
        policy: &PolicyId,
    ) -> Result<Decimal> {
        let lock = self
            .locks
            .remove(policy)
            .ok_or_else(|| AllocationError::NoAllocationsFound(policy.clone()))?;

        for record in &lock.allocations {
            ledger.release_collateral(&record.provider, &lock.asset, record.amount)?;
            self.decrement_exposure(&record.provider, &lock.asset, lock.expiration, record.amount);
        }
        self.liquidity
            .sub(lock.expiration, &lock.asset, &lock.tier, lock.total);

        info!(policy = %policy, asset = %lock.asset, total = %lock.total, "Collateral released");
        outbox.record(LedgerEvent::CollateralReleased {
            policy: policy.clone(),
            asset: lock.asset.clone(),
            expiration: lock.expiration,
            total: lock.total,
        });
        Ok(lock.total)
    }

    /// Take a policy's lock out for settlement
    ///
    /// Removes the records and unwinds exposure and liquidity tracking.
    /// The ledger balances are untouched here; the settlement engine
    /// consumes or releases them per provider share.
    pub fn consume_for_settlement(&mut self, policy: &PolicyId) -> Result<PolicyLock> {
        let lock = self
            .locks
            .remove(policy)
            .ok_or_else(|| AllocationError::NoAllocationsFound(policy.clone()))?;

        for record in &lock.allocations {
            self.decrement_exposure(&record.provider, &lock.asset, lock.expiration, record.amount);
        }
        self.liquidity
            .sub(lock.expiration, &lock.asset, &lock.tier, lock.total);
        debug!(policy = %policy, total = %lock.total, "Lock taken for settlement");
        Ok(lock)
    }

    /// Idempotently mark an expiration height's liquidity as prepared
    pub fn prepare_liquidity_for_expiration(
        &mut self,
        outbox: &EventOutbox,
        expiration: BlockHeight,
    ) {
        if self.liquidity.prepare(expiration) {
            info!(height = expiration, "Liquidity prepared for expiration");
            outbox.record(LedgerEvent::LiquidityPrepared { expiration });
        }
    }

    // ------------------------------- lookups -------------------------------

    /// A provider's allocation toward one policy, if any
    pub fn allocation(&self, provider: &ProviderId, policy: &PolicyId) -> Option<&PolicyAllocation> {
        self.locks
            .get(policy)?
            .allocations
            .iter()
            .find(|record| &record.provider == provider)
    }

    /// A policy's lock, if collateral is currently held against it
    pub fn lock(&self, policy: &PolicyId) -> Option<&PolicyLock> {
        self.locks.get(policy)
    }

    /// All allocation records backing a policy
    pub fn allocations_for_policy(&self, policy: &PolicyId) -> Option<&[PolicyAllocation]> {
        self.locks.get(policy).map(|lock| lock.allocations.as_slice())
    }

    pub fn has_allocations(&self, policy: &PolicyId) -> bool {
        self.locks.contains_key(policy)
    }

    /// A provider's committed collateral in an asset at an expiration
    pub fn exposure(&self, provider: &ProviderId, asset: &AssetId, expiration: BlockHeight) -> Decimal {
        self.exposures
            .get(&(provider.clone(), asset.clone(), expiration))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Aggregate liquidity requirement at an expiration height
    pub fn liquidity_need(&self, expiration: BlockHeight) -> Option<&ExpirationNeed> {
        self.liquidity.need(expiration)
    }

    /// Requirement at a height for one asset
    pub fn asset_requirement(&self, expiration: BlockHeight, asset: &AssetId) -> Decimal {
        self.liquidity.asset_requirement(expiration, asset)
    }

    /// Requirement at a height for one asset and tier
    pub fn tier_requirement(
        &self,
        expiration: BlockHeight,
        asset: &AssetId,
        tier: &TierName,
    ) -> Decimal {
        self.liquidity.tier_requirement(expiration, asset, tier)
    }

    // ------------------------------- internals -------------------------------

    /// Providers able to back a lock under the given tier, along with a
    /// snapshot of each one's own tier parameters
    fn eligible_candidates(
        &self,
        ledger: &CapitalLedger,
        tiers: &TierCatalog,
        tier: &TierName,
        asset: &AssetId,
        expiration: BlockHeight,
    ) -> Result<(Vec<CandidateProvider>, HashMap<ProviderId, TierSnapshot>)> {
        let lock_params = tiers.params(tier)?;

        let mut candidates = Vec::new();
        let mut snapshots = HashMap::new();
        for (provider, balance) in ledger.providers_in_asset(asset) {
            if !balance.is_active() {
                continue;
            }
            let eligible = match lock_params.kind {
                TierKind::Provider => balance.tier == *tier,
                TierKind::Buyer => tiers.is_compatible(tier, &balance.tier)?,
            };
            if !eligible {
                continue;
            }
            let provider_params = tiers.params(&balance.tier)?;
            if !provider_params.active {
                continue;
            }
            let limit = apply_bps(balance.deposited, provider_params.max_exposure_bps);
            let headroom = limit - self.exposure(provider, asset, expiration);
            if balance.available > Decimal::ZERO && headroom > Decimal::ZERO {
                candidates.push(CandidateProvider {
                    provider: provider.clone(),
                    available: balance.available,
                    exposure_headroom: headroom,
                });
                snapshots.insert(
                    provider.clone(),
                    TierSnapshot {
                        name: balance.tier.clone(),
                        collateral_ratio_bps: provider_params.collateral_ratio_bps,
                        premium_multiplier_bps: provider_params.premium_multiplier_bps,
                        max_exposure_bps: provider_params.max_exposure_bps,
                    },
                );
            }
        }
        Ok((candidates, snapshots))
    }

    fn decrement_exposure(
        &mut self,
        provider: &ProviderId,
        asset: &AssetId,
        expiration: BlockHeight,
        amount: Decimal,
    ) {
        if let Some(exposure) =
            self.exposures
                .get_mut(&(provider.clone(), asset.clone(), expiration))
        {
            *exposure = (*exposure - amount).max(Decimal::ZERO);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::EvenSplitStrategy;
    use palisade_common::{EngineError, ErrorKind, EventOutbox};
    use palisade_tiers::StaticTierSource;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn ustx() -> AssetId {
        AssetId::from("uSTX")
    }

    fn balanced() -> TierName {
        TierName::from("balanced")
    }

    fn setup() -> (CapitalLedger, TierCatalog, EventOutbox, AllocationEngine) {
        let outbox = EventOutbox::with_sinks(vec![]);
        let mut ledger = CapitalLedger::new(Arc::new(EventOutbox::with_sinks(vec![])));
        ledger.initialize_asset(ustx(), None).unwrap();
        let tiers = TierCatalog::new(Arc::new(StaticTierSource::with_defaults()));
        let engine = AllocationEngine::new(Box::new(EvenSplitStrategy::default()));
        (ledger, tiers, outbox, engine)
    }

    fn fund(ledger: &mut CapitalLedger, id: &str, amount: Decimal) {
        ledger
            .deposit(&ProviderId::from(id), amount, &ustx(), &balanced())
            .unwrap();
    }

    #[test]
    fn test_lock_splits_evenly_across_two_providers() {
        let (mut ledger, tiers, outbox, mut engine) = setup();
        fund(&mut ledger, "p1", dec!(10000));
        fund(&mut ledger, "p2", dec!(10000));

        engine
            .lock_collateral(
                &mut ledger,
                &tiers,
                &outbox,
                &PolicyId::from("pol-1"),
                dec!(1500),
                &ustx(),
                &balanced(),
                100, "buyer-1",
            )
            .unwrap();

        let records = engine.allocations_for_policy(&PolicyId::from("pol-1")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].amount, dec!(750));
        assert_eq!(records[1].amount, dec!(750));

        for id in ["p1", "p2"] {
            let balance = ledger.provider_balance(&ProviderId::from(id), &ustx()).unwrap();
            assert_eq!(balance.allocated, dec!(750));
            assert_eq!(balance.available, dec!(9250));
        }
        assert_eq!(ledger.asset_balance(&ustx()).unwrap().locked, dec!(1500));
        assert_eq!(engine.liquidity_need(100).unwrap().total_required, dec!(1500));
    }

    #[test]
    fn test_double_lock_rejected() {
        let (mut ledger, tiers, outbox, mut engine) = setup();
        fund(&mut ledger, "p1", dec!(10000));

        let pol = PolicyId::from("pol-1");
        engine
            .lock_collateral(&mut ledger, &tiers, &outbox, &pol, dec!(100), &ustx(), &balanced(), 100, "buyer-1")
            .unwrap();
        let err = engine
            .lock_collateral(&mut ledger, &tiers, &outbox, &pol, dec!(100), &ustx(), &balanced(), 100, "buyer-1")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyFinalized);
    }

    #[test]
    fn test_lock_requires_positive_amount() {
        let (mut ledger, tiers, outbox, mut engine) = setup();
        let err = engine
            .lock_collateral(
                &mut ledger,
                &tiers,
                &outbox,
                &PolicyId::from("pol-1"),
                dec!(0),
                &ustx(),
                &balanced(),
                100, "buyer-1",
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_lock_no_matching_tier_providers() {
        let (mut ledger, tiers, outbox, mut engine) = setup();
        ledger
            .deposit(
                &ProviderId::from("p1"),
                dec!(10000),
                &ustx(),
                &TierName::from("aggressive"),
            )
            .unwrap();

        let err = engine
            .lock_collateral(
                &mut ledger,
                &tiers,
                &outbox,
                &PolicyId::from("pol-1"),
                dec!(100),
                &ustx(),
                &balanced(),
                100, "buyer-1",
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Allocation(AllocationError::NoEligibleProviders { .. })
        ));
    }

    #[test]
    fn test_buyer_tier_lock_spans_provider_tiers() {
        let (mut ledger, tiers, outbox, mut engine) = setup();
        // standard (level 50) is covered by balanced (60) and aggressive
        // (90) providers but not conservative (30)
        fund(&mut ledger, "p1", dec!(10000));
        ledger
            .deposit(
                &ProviderId::from("p2"),
                dec!(10000),
                &ustx(),
                &TierName::from("aggressive"),
            )
            .unwrap();
        ledger
            .deposit(
                &ProviderId::from("p3"),
                dec!(10000),
                &ustx(),
                &TierName::from("conservative"),
            )
            .unwrap();

        let pol = PolicyId::from("pol-1");
        engine
            .lock_collateral(
                &mut ledger,
                &tiers,
                &outbox,
                &pol,
                dec!(1500),
                &ustx(),
                &TierName::from("standard"),
                100, "buyer-1",
            )
            .unwrap();

        let records = engine.allocations_for_policy(&pol).unwrap();
        assert_eq!(records.len(), 2);
        // Each record snapshots the backing provider's own tier
        let snapshot_of = |id: &str| {
            &records
                .iter()
                .find(|r| r.provider.as_str() == id)
                .unwrap()
                .tier
        };
        assert_eq!(snapshot_of("p1").premium_multiplier_bps, 10_000);
        assert_eq!(snapshot_of("p2").premium_multiplier_bps, 12_500);
        assert!(engine.allocation(&ProviderId::from("p3"), &pol).is_none());
        // The lock itself remembers the requested buyer tier
        assert_eq!(engine.lock(&pol).unwrap().tier, TierName::from("standard"));
    }

    #[test]
    fn test_exposure_limit_enforced() {
        let (mut ledger, tiers, outbox, mut engine) = setup();
        // balanced max exposure is 50% of deposited: limit = 500
        fund(&mut ledger, "p1", dec!(1000));

        engine
            .lock_collateral(
                &mut ledger,
                &tiers,
                &outbox,
                &PolicyId::from("pol-1"),
                dec!(400),
                &ustx(),
                &balanced(),
                100, "buyer-1",
            )
            .unwrap();
        assert_eq!(engine.exposure(&ProviderId::from("p1"), &ustx(), 100), dec!(400));

        // Only 100 headroom left at height 100, so the provider cannot
        // cover a 200 requirement there
        let err = engine
            .lock_collateral(
                &mut ledger,
                &tiers,
                &outbox,
                &PolicyId::from("pol-2"),
                dec!(200),
                &ustx(),
                &balanced(),
                100, "buyer-1",
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capacity);

        // A different expiration carries its own exposure limit
        engine
            .lock_collateral(
                &mut ledger,
                &tiers,
                &outbox,
                &PolicyId::from("pol-3"),
                dec!(200),
                &ustx(),
                &balanced(),
                200, "buyer-1",
            )
            .unwrap();
    }

    #[test]
    fn test_release_returns_collateral() {
        let (mut ledger, tiers, outbox, mut engine) = setup();
        fund(&mut ledger, "p1", dec!(10000));
        fund(&mut ledger, "p2", dec!(10000));

        let pol = PolicyId::from("pol-1");
        engine
            .lock_collateral(&mut ledger, &tiers, &outbox, &pol, dec!(1500), &ustx(), &balanced(), 100, "buyer-1")
            .unwrap();
        let released = engine.release_collateral(&mut ledger, &outbox, &pol).unwrap();
        assert_eq!(released, dec!(1500));

        assert!(!engine.has_allocations(&pol));
        assert_eq!(engine.exposure(&ProviderId::from("p1"), &ustx(), 100), dec!(0));
        assert_eq!(engine.liquidity_need(100).unwrap().total_required, dec!(0));
        let balance = ledger.provider_balance(&ProviderId::from("p1"), &ustx()).unwrap();
        assert_eq!(balance.available, dec!(10000));
        assert_eq!(balance.allocated, dec!(0));

        // Releasing again is NotFound
        let err = engine.release_collateral(&mut ledger, &outbox, &pol).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_consume_for_settlement_removes_tracking() {
        let (mut ledger, tiers, outbox, mut engine) = setup();
        fund(&mut ledger, "p1", dec!(10000));

        let pol = PolicyId::from("pol-1");
        engine
            .lock_collateral(&mut ledger, &tiers, &outbox, &pol, dec!(500), &ustx(), &balanced(), 100, "buyer-1")
            .unwrap();

        let lock = engine.consume_for_settlement(&pol).unwrap();
        assert_eq!(lock.allocations.len(), 1);
        assert_eq!(lock.total, dec!(500));
        assert!(!engine.has_allocations(&pol));
        assert_eq!(engine.exposure(&ProviderId::from("p1"), &ustx(), 100), dec!(0));

        // Ledger still holds the lock; settlement unwinds it per share
        let balance = ledger.provider_balance(&ProviderId::from("p1"), &ustx()).unwrap();
        assert_eq!(balance.allocated, dec!(500));
    }

    #[test]
    fn test_prepare_liquidity_emits_once() {
        let (_ledger, _tiers, outbox, mut engine) = setup();
        engine.prepare_liquidity_for_expiration(&outbox, 100);
        engine.prepare_liquidity_for_expiration(&outbox, 100);
        assert_eq!(outbox.len(), 1);
        assert!(engine.liquidity_need(100).unwrap().prepared);
    }

    #[test]
    fn test_tier_snapshot_captured_at_lock() {
        let (mut ledger, tiers, outbox, mut engine) = setup();
        fund(&mut ledger, "p1", dec!(10000));

        let pol = PolicyId::from("pol-1");
        engine
            .lock_collateral(&mut ledger, &tiers, &outbox, &pol, dec!(100), &ustx(), &balanced(), 100, "buyer-1")
            .unwrap();

        let record = engine.allocation(&ProviderId::from("p1"), &pol).unwrap();
        assert_eq!(record.tier.collateral_ratio_bps, 15_000);
        assert_eq!(record.tier.premium_multiplier_bps, 10_000);
    }
}
