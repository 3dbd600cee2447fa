//! Premium distribution engine
//!
//! Records a policy's premium payment once, accruing each contributing
//! provider's pending share immediately, and later converts those pending
//! shares into claimable earned balance in a single terminal distribution
//! step. Also runs the unclaimed-premium sweep.

use std::collections::HashMap;

use chrono::Utc;
use palisade_allocation::AllocationEngine;
use palisade_common::{
    apply_bps, proportional_shares, AllocationError, AssetId, BlockHeight, EventOutbox,
    LedgerError, LedgerEvent, PolicyId, PremiumError, ProviderId, Result, SweepDestination,
};
use palisade_ledger::CapitalLedger;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::records::PremiumRecord;
use crate::sweep::{SweepOutcome, SweepPolicy, SweepSettings};

#[derive(Default)]
pub struct PremiumEngine {
    records: HashMap<PolicyId, PremiumRecord>,
}

impl PremiumEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a policy's premium payment and accrue pending shares
    ///
    /// Shares are proportional to each provider's allocated collateral;
    /// with `tier_weighted` set, the weight is the allocation scaled by the
    /// provider tier's premium multiplier, so riskier tiers earn a larger
    /// share for equal collateral. Once-only per policy.
    #[allow(clippy::too_many_arguments)]
    pub fn record_premium_payment(
        &mut self,
        ledger: &mut CapitalLedger,
        allocations: &AllocationEngine,
        outbox: &EventOutbox,
        policy: &PolicyId,
        amount: Decimal,
        asset: &AssetId,
        expiration: BlockHeight,
        owner: &str,
        tier_weighted: bool,
    ) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(PremiumError::InvalidAmount.into());
        }
        if self.records.contains_key(policy) {
            return Err(PremiumError::AlreadyRecorded(policy.clone()).into());
        }

        let records = allocations
            .allocations_for_policy(policy)
            .ok_or_else(|| AllocationError::NoAllocationsFound(policy.clone()))?;

        let weights: Vec<(ProviderId, Decimal)> = records
            .iter()
            .map(|r| {
                let weight = if tier_weighted {
                    apply_bps(r.amount, r.tier.premium_multiplier_bps)
                } else {
                    r.amount
                };
                (r.provider.clone(), weight)
            })
            .collect();
        let shares = proportional_shares(amount, &weights);

        for (provider, share) in &shares {
            if *share > Decimal::ZERO {
                ledger.accrue_pending_premium(provider, asset, *share)?;
            }
        }

        info!(
            policy = %policy,
            asset = %asset,
            %amount,
            providers = shares.len(),
            tier_weighted,
            "Premium recorded"
        );
        outbox.record(LedgerEvent::PremiumRecorded {
            policy: policy.clone(),
            asset: asset.clone(),
            amount,
            expiration,
            shares: shares.clone(),
        });

        self.records.insert(
            policy.clone(),
            PremiumRecord {
                policy: policy.clone(),
                asset: asset.clone(),
                amount,
                expiration,
                owner: owner.to_string(),
                shares,
                distributed: false,
                recorded_at: Utc::now().timestamp_millis(),
                distributed_at: None,
            },
        );
        Ok(())
    }

    /// Convert a policy's pending premium shares into earned balance
    ///
    /// Terminal per policy: a second call returns `AlreadyDistributed`.
    pub fn distribute_premium(
        &mut self,
        ledger: &mut CapitalLedger,
        outbox: &EventOutbox,
        policy: &PolicyId,
        asset: &AssetId,
        height: BlockHeight,
    ) -> Result<()> {
        let record = self
            .records
            .get(policy)
            .ok_or_else(|| PremiumError::RecordNotFound(policy.clone()))?;
        if record.distributed {
            return Err(PremiumError::AlreadyDistributed(policy.clone()).into());
        }

        // Validate every share against its provider's pending balance
        // before converting any of them; a shortfall (the sweep may have
        // drained a share since recording) must leave the ledger untouched
        for (provider, share) in &record.shares {
            if *share > Decimal::ZERO {
                let pending = ledger.provider_balance(provider, asset)?.pending_premiums;
                if pending < *share {
                    return Err(LedgerError::InsufficientPending {
                        required: *share,
                        pending,
                    }
                    .into());
                }
            }
        }
        for (provider, share) in record.shares.clone() {
            if share > Decimal::ZERO {
                ledger.pending_to_earned(&provider, asset, share)?;
            }
        }

        let record = self
            .records
            .get_mut(policy)
            .ok_or_else(|| PremiumError::RecordNotFound(policy.clone()))?;
        record.distributed = true;
        record.distributed_at = Some(Utc::now().timestamp_millis());

        info!(policy = %policy, asset = %asset, amount = %record.amount, "Premium distributed");
        outbox.record(LedgerEvent::PremiumDistributed {
            policy: policy.clone(),
            asset: asset.clone(),
            amount: record.amount,
            height,
        });
        Ok(())
    }

    /// Sweep premiums providers have left untouched past the age threshold
    ///
    /// Depending on the configured policy, swept amounts are either
    /// redistributed to providers still holding principal in the asset
    /// (proportionally to their deposits) or forwarded to the treasury
    /// account. `now` is the caller's clock in Unix millis.
    pub fn sweep_unclaimed(
        &mut self,
        ledger: &mut CapitalLedger,
        outbox: &EventOutbox,
        asset: &AssetId,
        now: i64,
        settings: &SweepSettings,
    ) -> Result<SweepOutcome> {
        let stale: Vec<ProviderId> = ledger
            .providers_in_asset(asset)
            .filter(|(_, balance)| {
                balance.pending_premiums + balance.earned_premiums > Decimal::ZERO
                    && now - balance.last_premium_activity >= settings.age_threshold_ms
            })
            .map(|(provider, _)| provider.clone())
            .collect();

        let mut outcome = SweepOutcome::default();
        for provider in stale {
            // Recipients are re-read per sweep so earlier redistributions
            // in the same pass do not change who counts as active
            let recipients: Vec<(ProviderId, Decimal)> = ledger
                .providers_in_asset(asset)
                .filter(|(p, balance)| **p != provider && balance.is_active())
                .map(|(p, balance)| (p.clone(), balance.deposited))
                .collect();

            let swept = ledger.sweep_premiums(&provider, asset)?;
            if swept <= Decimal::ZERO {
                continue;
            }
            outcome.providers_swept += 1;
            outcome.total_swept += swept;

            let destination = match settings.policy {
                SweepPolicy::RedistributeToActive if !recipients.is_empty() => {
                    for (p, share) in proportional_shares(swept, &recipients) {
                        if share > Decimal::ZERO {
                            ledger.credit_earned(&p, asset, share)?;
                        }
                    }
                    outcome.redistributed += swept;
                    SweepDestination::ActiveProviders
                }
                SweepPolicy::RedistributeToActive => {
                    warn!(
                        provider = %provider,
                        asset = %asset,
                        amount = %swept,
                        "No active providers to redistribute to; forwarding to treasury"
                    );
                    outcome.forwarded += swept;
                    SweepDestination::Treasury
                }
                SweepPolicy::ForwardToTreasury => {
                    debug!(
                        provider = %provider,
                        asset = %asset,
                        amount = %swept,
                        treasury = %settings.treasury_account,
                        "Unclaimed premiums forwarded to treasury"
                    );
                    outcome.forwarded += swept;
                    SweepDestination::Treasury
                }
            };

            outbox.record(LedgerEvent::PremiumSwept {
                provider: provider.clone(),
                asset: asset.clone(),
                amount: swept,
                destination,
            });
        }

        if outcome.providers_swept > 0 {
            info!(
                asset = %asset,
                providers = outcome.providers_swept,
                total = %outcome.total_swept,
                "Unclaimed-premium sweep completed"
            );
        }
        Ok(outcome)
    }

    // ------------------------------- lookups -------------------------------

    /// A policy's premium record, if one was recorded
    pub fn premium_record(&self, policy: &PolicyId) -> Option<&PremiumRecord> {
        self.records.get(policy)
    }

    pub fn is_distributed(&self, policy: &PolicyId) -> bool {
        self.records
            .get(policy)
            .map(|record| record.distributed)
            .unwrap_or(false)
    }
}
