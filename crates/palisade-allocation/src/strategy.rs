//! Provider selection strategies
//!
//! A strategy decides how a policy's required collateral is split across
//! eligible providers. Candidates arrive pre-filtered (active in the asset,
//! tier-compatible, positive headroom); the strategy only divides the
//! amount. Returned shares must sum exactly to the requirement.

use palisade_common::{AllocationError, PolicyId, ProviderId, Result};
use rust_decimal::Decimal;

/// An eligible provider as seen by a selection strategy
#[derive(Debug, Clone)]
pub struct CandidateProvider {
    pub provider: ProviderId,
    /// Unallocated balance in the policy's asset
    pub available: Decimal,
    /// Remaining room under the tier's per-expiration exposure limit
    pub exposure_headroom: Decimal,
}

impl CandidateProvider {
    /// The most this provider can take on for the policy
    pub fn capacity(&self) -> Decimal {
        self.available.min(self.exposure_headroom)
    }
}

/// One provider's portion of a policy's collateral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderShare {
    pub provider: ProviderId,
    pub amount: Decimal,
}

/// Splits a collateral requirement across candidate providers
pub trait SelectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Divide `required` across `candidates`. Shares must be positive and
    /// sum exactly to `required`.
    fn select(
        &self,
        policy: &PolicyId,
        required: Decimal,
        candidates: &[CandidateProvider],
    ) -> Result<Vec<ProviderShare>>;
}

/// Equal split across up to `max_candidates` providers, ordered by id
///
/// Sub-unit remainders from the division go to the first provider so the
/// shares always reconstruct the requirement exactly.
#[derive(Debug, Clone)]
pub struct EvenSplitStrategy {
    max_candidates: usize,
}

impl EvenSplitStrategy {
    pub fn new(max_candidates: usize) -> Self {
        Self {
            max_candidates: max_candidates.max(1),
        }
    }
}

impl Default for EvenSplitStrategy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl SelectionStrategy for EvenSplitStrategy {
    fn name(&self) -> &'static str {
        "even-split"
    }

    fn select(
        &self,
        policy: &PolicyId,
        required: Decimal,
        candidates: &[CandidateProvider],
    ) -> Result<Vec<ProviderShare>> {
        if candidates.is_empty() {
            return Err(AllocationError::NoEligibleProviders {
                policy: policy.clone(),
                required,
            }
            .into());
        }

        let mut ordered: Vec<&CandidateProvider> = candidates.iter().collect();
        ordered.sort_by(|a, b| a.provider.cmp(&b.provider));
        ordered.truncate(self.max_candidates);

        let count = Decimal::from(ordered.len() as u64);
        let base = (required / count).floor();
        let remainder = required - base * count;

        let mut shares = Vec::with_capacity(ordered.len());
        for (i, candidate) in ordered.iter().enumerate() {
            let amount = if i == 0 { base + remainder } else { base };
            if amount > Decimal::ZERO {
                shares.push(ProviderShare {
                    provider: candidate.provider.clone(),
                    amount,
                });
            }
        }
        Ok(shares)
    }
}

/// Greedy fill by remaining capacity, largest first
///
/// Each provider takes `min(remaining, capacity)` where capacity is the
/// smaller of available balance and exposure headroom. Fails with
/// `NoEligibleProviders` when the pool cannot cover the requirement, so a
/// partial fill is never produced.
#[derive(Debug, Clone, Default)]
pub struct CapacityWeightedStrategy;

impl SelectionStrategy for CapacityWeightedStrategy {
    fn name(&self) -> &'static str {
        "capacity-weighted"
    }

    fn select(
        &self,
        policy: &PolicyId,
        required: Decimal,
        candidates: &[CandidateProvider],
    ) -> Result<Vec<ProviderShare>> {
        let mut ordered: Vec<&CandidateProvider> = candidates
            .iter()
            .filter(|c| c.capacity() > Decimal::ZERO)
            .collect();
        // Largest capacity first, id as the deterministic tie-break
        ordered.sort_by(|a, b| {
            b.capacity()
                .cmp(&a.capacity())
                .then_with(|| a.provider.cmp(&b.provider))
        });

        let mut shares = Vec::new();
        let mut remaining = required;
        for candidate in ordered {
            if remaining <= Decimal::ZERO {
                break;
            }
            let take = remaining.min(candidate.capacity());
            shares.push(ProviderShare {
                provider: candidate.provider.clone(),
                amount: take,
            });
            remaining -= take;
        }

        if remaining > Decimal::ZERO {
            return Err(AllocationError::NoEligibleProviders {
                policy: policy.clone(),
                required,
            }
            .into());
        }
        Ok(shares)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn pol() -> PolicyId {
        PolicyId::from("pol-1")
    }

    fn candidate(id: &str, available: Decimal, headroom: Decimal) -> CandidateProvider {
        CandidateProvider {
            provider: ProviderId::from(id),
            available,
            exposure_headroom: headroom,
        }
    }

    #[test]
    fn test_even_split_two_providers() {
        let strategy = EvenSplitStrategy::default();
        let candidates = vec![
            candidate("provider-b", dec!(5000), dec!(5000)),
            candidate("provider-a", dec!(5000), dec!(5000)),
        ];
        let shares = strategy.select(&pol(), dec!(1500), &candidates).unwrap();
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].provider.as_str(), "provider-a");
        assert_eq!(shares[0].amount, dec!(750));
        assert_eq!(shares[1].amount, dec!(750));
    }

    #[test]
    fn test_even_split_remainder_to_first() {
        let strategy = EvenSplitStrategy::default();
        let candidates = vec![
            candidate("a", dec!(1000), dec!(1000)),
            candidate("b", dec!(1000), dec!(1000)),
            candidate("c", dec!(1000), dec!(1000)),
        ];
        let shares = strategy.select(&pol(), dec!(100), &candidates).unwrap();
        assert_eq!(shares[0].amount, dec!(34));
        assert_eq!(shares[1].amount, dec!(33));
        assert_eq!(shares[2].amount, dec!(33));
        let total: Decimal = shares.iter().map(|s| s.amount).sum();
        assert_eq!(total, dec!(100));
    }

    #[test]
    fn test_even_split_caps_candidate_count() {
        let strategy = EvenSplitStrategy::new(2);
        let candidates = vec![
            candidate("a", dec!(1000), dec!(1000)),
            candidate("b", dec!(1000), dec!(1000)),
            candidate("c", dec!(1000), dec!(1000)),
        ];
        let shares = strategy.select(&pol(), dec!(100), &candidates).unwrap();
        assert_eq!(shares.len(), 2);
    }

    #[test]
    fn test_even_split_no_candidates() {
        let strategy = EvenSplitStrategy::default();
        let err = strategy.select(&pol(), dec!(100), &[]).unwrap_err();
        assert!(matches!(
            err,
            palisade_common::EngineError::Allocation(AllocationError::NoEligibleProviders { .. })
        ));
    }

    #[test]
    fn test_capacity_weighted_fills_largest_first() {
        let strategy = CapacityWeightedStrategy;
        let candidates = vec![
            candidate("small", dec!(200), dec!(200)),
            candidate("big", dec!(900), dec!(900)),
        ];
        let shares = strategy.select(&pol(), dec!(1000), &candidates).unwrap();
        assert_eq!(shares[0].provider.as_str(), "big");
        assert_eq!(shares[0].amount, dec!(900));
        assert_eq!(shares[1].provider.as_str(), "small");
        assert_eq!(shares[1].amount, dec!(100));
    }

    #[test]
    fn test_capacity_weighted_respects_headroom() {
        let strategy = CapacityWeightedStrategy;
        // Plenty of balance but exposure headroom caps the take
        let candidates = vec![
            candidate("a", dec!(10000), dec!(300)),
            candidate("b", dec!(10000), dec!(300)),
        ];
        let shares = strategy.select(&pol(), dec!(500), &candidates).unwrap();
        assert_eq!(shares[0].amount, dec!(300));
        assert_eq!(shares[1].amount, dec!(200));
    }

    #[test]
    fn test_capacity_weighted_insufficient_pool() {
        let strategy = CapacityWeightedStrategy;
        let candidates = vec![candidate("a", dec!(100), dec!(100))];
        let err = strategy.select(&pol(), dec!(500), &candidates).unwrap_err();
        assert!(matches!(
            err,
            palisade_common::EngineError::Allocation(AllocationError::NoEligibleProviders { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_even_split_conserves_requirement(
            required in 1u64..1_000_000,
            count in 1usize..8,
        ) {
            let strategy = EvenSplitStrategy::default();
            let candidates: Vec<CandidateProvider> = (0..count)
                .map(|i| candidate(
                    &format!("provider-{i}"),
                    Decimal::from(u64::MAX / 2),
                    Decimal::from(u64::MAX / 2),
                ))
                .collect();
            let shares = strategy.select(&pol(), Decimal::from(required), &candidates).unwrap();
            let total: Decimal = shares.iter().map(|s| s.amount).sum();
            prop_assert_eq!(total, Decimal::from(required));
        }

        #[test]
        fn prop_capacity_weighted_conserves_requirement(
            required in 1u64..10_000,
            capacities in proptest::collection::vec(1u64..5_000, 1..8),
        ) {
            let strategy = CapacityWeightedStrategy;
            let candidates: Vec<CandidateProvider> = capacities
                .iter()
                .enumerate()
                .map(|(i, c)| candidate(
                    &format!("provider-{i}"),
                    Decimal::from(*c),
                    Decimal::from(*c),
                ))
                .collect();
            let pool: u64 = capacities.iter().sum();
            let result = strategy.select(&pol(), Decimal::from(required), &candidates);
            if required <= pool {
                let shares = result.unwrap();
                let total: Decimal = shares.iter().map(|s| s.amount).sum();
                prop_assert_eq!(total, Decimal::from(required));
                for share in &shares {
                    prop_assert!(share.amount > Decimal::ZERO);
                }
            } else {
                prop_assert!(result.is_err());
            }
        }
    }
}
