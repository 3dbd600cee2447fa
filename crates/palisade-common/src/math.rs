//! Proportional share arithmetic
//!
//! Settlement and premium distribution both split one amount across
//! providers in proportion to a weight (allocated collateral, or a
//! tier-adjusted variant of it). Shares are floor-rounded; the remainder
//! left over by the rounding goes to the largest-weight provider, with the
//! lexicographically smallest id breaking ties, so the shares always sum
//! back to the input amount exactly.

use rust_decimal::Decimal;

use crate::types::ids::ProviderId;

/// Split `amount` across providers in proportion to their weights
///
/// Returns one entry per input weight, in input order, summing exactly to
/// `amount`. An empty weight list or a non-positive weight total yields an
/// empty result.
pub fn proportional_shares(
    amount: Decimal,
    weights: &[(ProviderId, Decimal)],
) -> Vec<(ProviderId, Decimal)> {
    let total: Decimal = weights.iter().map(|(_, w)| *w).sum();
    if weights.is_empty() || total <= Decimal::ZERO {
        return Vec::new();
    }

    let mut shares: Vec<(ProviderId, Decimal)> = weights
        .iter()
        .map(|(provider, weight)| (provider.clone(), (*weight * amount / total).floor()))
        .collect();

    let distributed: Decimal = shares.iter().map(|(_, s)| *s).sum();
    let remainder = amount - distributed;
    if remainder > Decimal::ZERO {
        if let Some(idx) = largest_weight_index(weights) {
            shares[idx].1 += remainder;
        }
    }
    shares
}

fn largest_weight_index(weights: &[(ProviderId, Decimal)]) -> Option<usize> {
    weights
        .iter()
        .enumerate()
        .max_by(|(_, (a_id, a_w)), (_, (b_id, b_w))| {
            a_w.cmp(b_w).then_with(|| b_id.cmp(a_id))
        })
        .map(|(idx, _)| idx)
}
