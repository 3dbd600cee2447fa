//! Per-provider balance record
//!
//! One record per provider × asset, created on first deposit and never
//! deleted (it may rest at zero). Principal and premium accounting are kept
//! apart: settlement losses come out of `allocated`, never out of premium
//! balances, and premiums never inflate `deposited`.

use palisade_common::{LedgerError, Result, TierName};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A capital provider's balance in one asset
///
/// Invariant: `deposited == available + allocated` after every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderBalance {
    /// Principal currently in the pool
    pub deposited: Decimal,
    /// Principal not committed to any policy
    pub available: Decimal,
    /// Principal locked against open policies
    pub allocated: Decimal,
    /// Premium shares accrued but not yet distributed
    pub pending_premiums: Decimal,
    /// Distributed premium shares, claimable by the provider
    pub earned_premiums: Decimal,
    /// Risk tier the provider deposited under (latest deposit wins)
    pub tier: TierName,
    /// Last premium accrual/distribution/claim (Unix millis); drives the
    /// unclaimed-premium sweep age check
    pub last_premium_activity: i64,
    /// Timestamp of last modification (Unix millis)
    pub updated_at: i64,
}

impl ProviderBalance {
    /// Create an empty balance record under a tier
    pub fn new(tier: TierName) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            deposited: Decimal::ZERO,
            available: Decimal::ZERO,
            allocated: Decimal::ZERO,
            pending_premiums: Decimal::ZERO,
            earned_premiums: Decimal::ZERO,
            tier,
            last_premium_activity: now,
            updated_at: now,
        }
    }

    /// Credit deposited principal
    pub fn credit(&mut self, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount.into());
        }
        self.deposited += amount;
        self.available += amount;
        self.touch();
        Ok(())
    }

    /// Withdraw from available principal
    pub fn withdraw(&mut self, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount.into());
        }
        if self.available < amount {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: self.available,
            }
            .into());
        }
        self.deposited -= amount;
        self.available -= amount;
        self.touch();
        Ok(())
    }

    /// Commit available principal as policy collateral
    pub fn allocate(&mut self, amount: Decimal) -> Result<()> {
        if self.available < amount {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: self.available,
            }
            .into());
        }
        self.available -= amount;
        self.allocated += amount;
        self.touch();
        Ok(())
    }

    /// Return allocated collateral to available
    pub fn release(&mut self, amount: Decimal) -> Result<()> {
        if self.allocated < amount {
            return Err(LedgerError::InsufficientAllocated {
                required: amount,
                allocated: self.allocated,
            }
            .into());
        }
        self.allocated -= amount;
        self.available += amount;
        self.touch();
        Ok(())
    }

    /// Deduct a settlement share from allocated collateral; the principal
    /// leaves the pool
    pub fn consume_allocated(&mut self, amount: Decimal) -> Result<()> {
        if self.allocated < amount {
            return Err(LedgerError::InsufficientAllocated {
                required: amount,
                allocated: self.allocated,
            }
            .into());
        }
        self.allocated -= amount;
        self.deposited -= amount;
        self.touch();
        Ok(())
    }

    /// Accrue a pending premium share
    pub fn accrue_pending(&mut self, amount: Decimal) {
        self.pending_premiums += amount;
        self.touch_premium();
    }

    /// Convert a pending premium share into claimable earned balance
    pub fn pending_to_earned(&mut self, amount: Decimal) -> Result<()> {
        if self.pending_premiums < amount {
            return Err(LedgerError::InsufficientPending {
                required: amount,
                pending: self.pending_premiums,
            }
            .into());
        }
        self.pending_premiums -= amount;
        self.earned_premiums += amount;
        self.touch_premium();
        Ok(())
    }

    /// Zero the earned premium balance, returning the claimed amount
    pub fn claim_earned(&mut self) -> Decimal {
        let claimed = self.earned_premiums;
        self.earned_premiums = Decimal::ZERO;
        self.touch_premium();
        claimed
    }

    /// Zero both premium balances, returning the swept amount
    pub fn sweep_premiums(&mut self) -> Decimal {
        let swept = self.pending_premiums + self.earned_premiums;
        self.pending_premiums = Decimal::ZERO;
        self.earned_premiums = Decimal::ZERO;
        self.touch_premium();
        swept
    }

    /// Whether the provider holds any principal in this asset
    pub fn is_active(&self) -> bool {
        self.deposited > Decimal::ZERO
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    fn touch_premium(&mut self) {
        let now = chrono::Utc::now().timestamp_millis();
        self.last_premium_activity = now;
        self.updated_at = now;
    }
}

impl std::fmt::Display for ProviderBalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ProviderBalance(deposited={}, available={}, allocated={}, pending={}, earned={})",
            self.deposited,
            self.available,
            self.allocated,
            self.pending_premiums,
            self.earned_premiums
        )
    }
}
