//! Settlement engine
//!
//! Consumes a settled policy's allocations: each contributing provider
//! pays a floor-rounded share proportional to its allocation, the
//! remainder of the floor rounding lands on the largest allocator, and
//! whatever collateral is left over returns to the providers. Dropped
//! providers have their share redistributed over the remaining
//! contributors; their own collateral is released untouched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use palisade_allocation::{AllocationEngine, PolicyAllocation};
use palisade_common::{
    proportional_shares, AllocationError, AssetId, BlockHeight, EventOutbox, LedgerError,
    LedgerEvent, PolicyId, ProviderId, Result, SettlementError, BPS_DENOM,
};
use palisade_ledger::CapitalLedger;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::records::{SettlementImpact, SettlementRecord};
use crate::status::ProviderStatusSource;

pub struct SettlementEngine {
    settlements: HashMap<PolicyId, SettlementRecord>,
    impacts: HashMap<PolicyId, Vec<SettlementImpact>>,
    status: Arc<dyn ProviderStatusSource>,
}

impl SettlementEngine {
    pub fn new(status: Arc<dyn ProviderStatusSource>) -> Self {
        Self {
            settlements: HashMap::new(),
            impacts: HashMap::new(),
            status,
        }
    }

    /// Settle a concluded policy, paying `amount` to its owner out of the
    /// providers' locked collateral
    ///
    /// Terminal and idempotent: a second call for the same policy returns
    /// `AlreadySettled` without touching any balance. All share arithmetic
    /// is validated before the first balance mutation.
    #[allow(clippy::too_many_arguments)]
    pub fn process_settlement(
        &mut self,
        ledger: &mut CapitalLedger,
        allocations: &mut AllocationEngine,
        outbox: &EventOutbox,
        policy: &PolicyId,
        amount: Decimal,
        asset: &AssetId,
        owner: &str,
        height: BlockHeight,
    ) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(SettlementError::InvalidAmount.into());
        }
        if self.settlements.contains_key(policy) {
            return Err(SettlementError::AlreadySettled(policy.clone()).into());
        }

        let records = allocations
            .allocations_for_policy(policy)
            .ok_or_else(|| AllocationError::NoAllocationsFound(policy.clone()))?
            .to_vec();

        let total_allocated: Decimal = records.iter().map(|r| r.amount).sum();
        if amount > total_allocated {
            return Err(LedgerError::InsufficientAllocated {
                required: amount,
                allocated: total_allocated,
            }
            .into());
        }

        // Plan the shares against a read-only view; nothing is mutated
        // until the whole plan checks out.
        let valid: HashSet<ProviderId> = records
            .iter()
            .filter(|r| self.status.is_valid(&r.provider))
            .map(|r| r.provider.clone())
            .collect();

        let weights: Vec<(ProviderId, Decimal)> = records
            .iter()
            .map(|r| (r.provider.clone(), r.amount))
            .collect();
        let base = proportional_shares(amount, &weights);

        let mut shares: HashMap<ProviderId, Decimal> = HashMap::new();
        let mut dropouts: Vec<(ProviderId, Decimal)> = Vec::new();
        for (provider, share) in base {
            if valid.contains(&provider) {
                shares.insert(provider, share);
            } else {
                dropouts.push((provider, share));
            }
        }

        let valid_weights: Vec<(ProviderId, Decimal)> = records
            .iter()
            .filter(|r| valid.contains(&r.provider))
            .map(|r| (r.provider.clone(), r.amount))
            .collect();

        let mut shortfall = Decimal::ZERO;
        for (provider, dropped_share) in &dropouts {
            if valid_weights.is_empty() {
                warn!(
                    policy = %policy,
                    provider = %provider,
                    share = %dropped_share,
                    "Sole contributor dropped out; settlement share is unrecoverable"
                );
                shortfall += *dropped_share;
            } else {
                for (p, extra) in proportional_shares(*dropped_share, &valid_weights) {
                    *shares.entry(p).or_default() += extra;
                }
            }
        }
        shortfall += self.cap_shares_at_allocation(policy, &records, &valid, &mut shares);

        let paid: Decimal = shares.values().copied().sum();
        if paid + shortfall != amount {
            return Err(SettlementError::ShareMismatch {
                policy: policy.clone(),
                distributed: paid + shortfall,
                expected: amount,
            }
            .into());
        }

        // Commit: take the lock out and move the balances
        let lock = allocations.consume_for_settlement(policy)?;
        let mut remaining_total = Decimal::ZERO;
        let mut impacts = Vec::new();
        for record in &lock.allocations {
            if valid.contains(&record.provider) {
                let share = shares
                    .get(&record.provider)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                if share > Decimal::ZERO {
                    ledger.consume_allocated(&record.provider, asset, share)?;
                }
                let remaining = record.amount - share;
                if remaining > Decimal::ZERO {
                    ledger.release_collateral(&record.provider, asset, remaining)?;
                }
                remaining_total += remaining;
                impacts.push(SettlementImpact {
                    provider: record.provider.clone(),
                    policy: policy.clone(),
                    share,
                    allocated: record.amount,
                    allocation_bps: record.amount * Decimal::from(BPS_DENOM) / total_allocated,
                    tier: record.tier.clone(),
                });
            } else {
                // A dropped provider keeps its collateral; the valid
                // contributors covered its share above
                ledger.release_collateral(&record.provider, asset, record.amount)?;
            }
        }

        for (provider, dropped_share) in dropouts {
            outbox.record(LedgerEvent::ProviderDropout {
                policy: policy.clone(),
                provider,
                share: dropped_share,
                redistributed: !valid_weights.is_empty(),
            });
        }

        let record = SettlementRecord {
            policy: policy.clone(),
            asset: asset.clone(),
            owner: owner.to_string(),
            amount,
            height,
            remaining_collateral: remaining_total,
            unrecoverable: shortfall,
            settled_at: Utc::now().timestamp_millis(),
        };

        info!(
            policy = %policy,
            asset = %asset,
            %amount,
            paid = %paid,
            unrecoverable = %shortfall,
            remaining = %remaining_total,
            "Settlement processed"
        );
        outbox.record(LedgerEvent::SettlementProcessed {
            policy: policy.clone(),
            asset: asset.clone(),
            owner: owner.to_string(),
            amount,
            height,
            remaining_collateral: remaining_total,
        });

        self.impacts.insert(policy.clone(), impacts);
        self.settlements.insert(policy.clone(), record);
        Ok(())
    }

    /// Clip shares that exceed a provider's allocation, pushing the
    /// overflow to contributors with headroom; whatever no contributor can
    /// absorb is returned as unrecoverable shortfall.
    fn cap_shares_at_allocation(
        &self,
        policy: &PolicyId,
        records: &[PolicyAllocation],
        valid: &HashSet<ProviderId>,
        shares: &mut HashMap<ProviderId, Decimal>,
    ) -> Decimal {
        loop {
            let mut overflow = Decimal::ZERO;
            for record in records.iter().filter(|r| valid.contains(&r.provider)) {
                if let Some(share) = shares.get_mut(&record.provider) {
                    if *share > record.amount {
                        overflow += *share - record.amount;
                        *share = record.amount;
                    }
                }
            }
            if overflow == Decimal::ZERO {
                return Decimal::ZERO;
            }

            let headroom: Vec<(ProviderId, Decimal)> = records
                .iter()
                .filter(|r| valid.contains(&r.provider))
                .filter_map(|r| {
                    let used = shares.get(&r.provider).copied().unwrap_or(Decimal::ZERO);
                    let room = r.amount - used;
                    (room > Decimal::ZERO).then(|| (r.provider.clone(), room))
                })
                .collect();
            if headroom.is_empty() {
                warn!(
                    policy = %policy,
                    %overflow,
                    "No contributor can absorb the redistributed share; recording shortfall"
                );
                return overflow;
            }
            for (p, extra) in proportional_shares(overflow, &headroom) {
                *shares.entry(p).or_default() += extra;
            }
        }
    }

    // ------------------------------- lookups -------------------------------

    /// Terminal settlement record for a policy, if settled
    pub fn settlement(&self, policy: &PolicyId) -> Option<&SettlementRecord> {
        self.settlements.get(policy)
    }

    /// Per-provider impact entries for a settled policy
    pub fn impacts(&self, policy: &PolicyId) -> Option<&[SettlementImpact]> {
        self.impacts.get(policy).map(Vec::as_slice)
    }

    pub fn is_settled(&self, policy: &PolicyId) -> bool {
        self.settlements.contains_key(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::AllValidStatusSource;
    use palisade_allocation::{CapacityWeightedStrategy, EvenSplitStrategy};
    use palisade_common::{EngineError, ErrorKind, TierName};
    use palisade_tiers::{StaticTierSource, TierCatalog};
    use rust_decimal_macros::dec;

    struct DropList(Vec<ProviderId>);

    impl ProviderStatusSource for DropList {
        fn is_valid(&self, provider: &ProviderId) -> bool {
            !self.0.contains(provider)
        }
    }

    fn ustx() -> AssetId {
        AssetId::from("uSTX")
    }

    fn balanced() -> TierName {
        TierName::from("balanced")
    }

    fn pol() -> PolicyId {
        PolicyId::from("pol-1")
    }

    struct Harness {
        ledger: CapitalLedger,
        tiers: TierCatalog,
        outbox: EventOutbox,
        allocations: AllocationEngine,
        settlements: SettlementEngine,
    }

    fn harness(status: Arc<dyn ProviderStatusSource>) -> Harness {
        let mut ledger = CapitalLedger::new(Arc::new(EventOutbox::with_sinks(vec![])));
        ledger.initialize_asset(ustx(), None).unwrap();
        Harness {
            ledger,
            tiers: TierCatalog::new(Arc::new(StaticTierSource::with_defaults())),
            outbox: EventOutbox::with_sinks(vec![]),
            allocations: AllocationEngine::new(Box::new(EvenSplitStrategy::default())),
            settlements: SettlementEngine::new(status),
        }
    }

    fn fund(h: &mut Harness, id: &str, amount: Decimal) {
        h.ledger
            .deposit(&ProviderId::from(id), amount, &ustx(), &balanced())
            .unwrap();
    }

    fn lock(h: &mut Harness, required: Decimal) {
        h.allocations
            .lock_collateral(
                &mut h.ledger,
                &h.tiers,
                &h.outbox,
                &pol(),
                required,
                &ustx(),
                &balanced(),
                100, "buyer-1",
            )
            .unwrap();
    }

    fn settle(h: &mut Harness, amount: Decimal) -> Result<()> {
        h.settlements.process_settlement(
            &mut h.ledger,
            &mut h.allocations,
            &h.outbox,
            &pol(),
            amount,
            &ustx(),
            "buyer-1",
            105,
        )
    }

    #[test]
    fn test_settlement_splits_proportionally() {
        let mut h = harness(Arc::new(AllValidStatusSource));
        fund(&mut h, "p1", dec!(10000));
        fund(&mut h, "p2", dec!(10000));
        lock(&mut h, dec!(1500));

        settle(&mut h, dec!(300)).unwrap();

        for id in ["p1", "p2"] {
            let balance = h
                .ledger
                .provider_balance(&ProviderId::from(id), &ustx())
                .unwrap();
            assert_eq!(balance.deposited, dec!(9850));
            assert_eq!(balance.available, dec!(9850));
            assert_eq!(balance.allocated, dec!(0));
        }

        let record = h.settlements.settlement(&pol()).unwrap();
        assert_eq!(record.amount, dec!(300));
        assert_eq!(record.remaining_collateral, dec!(1200));
        assert_eq!(record.unrecoverable, dec!(0));
        assert_eq!(record.height, 105);
        assert_eq!(record.owner, "buyer-1");

        let impacts = h.settlements.impacts(&pol()).unwrap();
        assert_eq!(impacts.len(), 2);
        for impact in impacts {
            assert_eq!(impact.share, dec!(150));
            assert_eq!(impact.allocation_bps, dec!(5000));
            assert_eq!(impact.tier.collateral_ratio_bps, 15_000);
        }
    }

    #[test]
    fn test_settlement_idempotent() {
        let mut h = harness(Arc::new(AllValidStatusSource));
        fund(&mut h, "p1", dec!(10000));
        fund(&mut h, "p2", dec!(10000));
        lock(&mut h, dec!(1500));

        settle(&mut h, dec!(300)).unwrap();
        let before = h
            .ledger
            .provider_balance(&ProviderId::from("p1"), &ustx())
            .unwrap()
            .clone();

        let err = settle(&mut h, dec!(300)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyFinalized);

        let after = h
            .ledger
            .provider_balance(&ProviderId::from("p1"), &ustx())
            .unwrap();
        assert_eq!(after.deposited, before.deposited);
        assert_eq!(after.available, before.available);
    }

    #[test]
    fn test_rounding_remainder_to_largest_allocator() {
        let mut h = harness(Arc::new(AllValidStatusSource));
        h.allocations = AllocationEngine::new(Box::new(CapacityWeightedStrategy));
        // balanced exposure limit is 50% of deposited: p1 caps at 5000,
        // p2 at 2500, so a 6000 requirement fills 5000/1000
        fund(&mut h, "p1", dec!(10000));
        fund(&mut h, "p2", dec!(5000));
        lock(&mut h, dec!(6000));

        settle(&mut h, dec!(100)).unwrap();

        // floor shares 83 and 16 leave a remainder of 1 for the largest
        let impacts = h.settlements.impacts(&pol()).unwrap();
        let share_of = |id: &str| {
            impacts
                .iter()
                .find(|i| i.provider.as_str() == id)
                .unwrap()
                .share
        };
        assert_eq!(share_of("p1"), dec!(84));
        assert_eq!(share_of("p2"), dec!(16));
    }

    #[test]
    fn test_settlement_without_allocations() {
        let mut h = harness(Arc::new(AllValidStatusSource));
        let err = settle(&mut h, dec!(100)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_settlement_exceeding_collateral() {
        let mut h = harness(Arc::new(AllValidStatusSource));
        fund(&mut h, "p1", dec!(10000));
        lock(&mut h, dec!(500));

        let err = settle(&mut h, dec!(501)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capacity);
        // The lock is untouched
        assert!(h.allocations.has_allocations(&pol()));
    }

    #[test]
    fn test_settlement_rejects_non_positive_amount() {
        let mut h = harness(Arc::new(AllValidStatusSource));
        let err = settle(&mut h, dec!(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_dropout_share_redistributed() {
        let mut h = harness(Arc::new(DropList(vec![ProviderId::from("p2")])));
        fund(&mut h, "p1", dec!(10000));
        fund(&mut h, "p2", dec!(10000));
        lock(&mut h, dec!(1500));

        settle(&mut h, dec!(300)).unwrap();

        // p1 covers p2's 150 on top of its own
        let p1 = h
            .ledger
            .provider_balance(&ProviderId::from("p1"), &ustx())
            .unwrap();
        assert_eq!(p1.deposited, dec!(9700));

        // The dropped provider's collateral comes back untouched
        let p2 = h
            .ledger
            .provider_balance(&ProviderId::from("p2"), &ustx())
            .unwrap();
        assert_eq!(p2.deposited, dec!(10000));
        assert_eq!(p2.available, dec!(10000));

        let record = h.settlements.settlement(&pol()).unwrap();
        assert_eq!(record.unrecoverable, dec!(0));

        let dropout_events: Vec<_> = h
            .outbox
            .events()
            .into_iter()
            .filter(|e| e.event.event_type() == "ProviderDropout")
            .collect();
        assert_eq!(dropout_events.len(), 1);
        assert!(matches!(
            dropout_events[0].event,
            LedgerEvent::ProviderDropout {
                redistributed: true,
                ..
            }
        ));
    }

    #[test]
    fn test_sole_contributor_dropout_records_shortfall() {
        let mut h = harness(Arc::new(DropList(vec![ProviderId::from("p1")])));
        fund(&mut h, "p1", dec!(10000));
        lock(&mut h, dec!(750));

        settle(&mut h, dec!(300)).unwrap();

        let record = h.settlements.settlement(&pol()).unwrap();
        assert_eq!(record.unrecoverable, dec!(300));
        assert_eq!(record.remaining_collateral, dec!(0));

        let p1 = h
            .ledger
            .provider_balance(&ProviderId::from("p1"), &ustx())
            .unwrap();
        assert_eq!(p1.deposited, dec!(10000));
        assert_eq!(p1.allocated, dec!(0));

        let dropout_events: Vec<_> = h
            .outbox
            .events()
            .into_iter()
            .filter(|e| e.event.event_type() == "ProviderDropout")
            .collect();
        assert!(matches!(
            dropout_events[0].event,
            LedgerEvent::ProviderDropout {
                redistributed: false,
                ..
            }
        ));
    }

    #[test]
    fn test_release_after_settlement_is_not_found() {
        let mut h = harness(Arc::new(AllValidStatusSource));
        fund(&mut h, "p1", dec!(10000));
        lock(&mut h, dec!(500));
        settle(&mut h, dec!(100)).unwrap();

        let err = h
            .allocations
            .release_collateral(&mut h.ledger, &h.outbox, &pol())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(h.settlements.is_settled(&pol()));
    }
}
