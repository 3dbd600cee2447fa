//! Per-asset pool balance

use palisade_common::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregate balance of one collateral asset across the whole pool
///
/// Invariant: `total == available + locked` after every operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetBalance {
    /// Total pool balance
    pub total: Decimal,
    /// Balance not committed to any policy
    pub available: Decimal,
    /// Balance locked as collateral for open policies
    pub locked: Decimal,
}

impl AssetBalance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add deposited capital to the pool
    pub fn deposit(&mut self, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount.into());
        }
        self.total += amount;
        self.available += amount;
        Ok(())
    }

    /// Remove withdrawn capital from the pool
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
        self.total -= amount;
        self.available -= amount;
        Ok(())
    }

    /// Move available balance into the locked bucket
    pub fn lock(&mut self, amount: Decimal) -> Result<()> {
        if self.available < amount {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: self.available,
            }
            .into());
        }
        self.available -= amount;
        self.locked += amount;
        Ok(())
    }

    /// Move locked balance back to available
    pub fn unlock(&mut self, amount: Decimal) -> Result<()> {
        if self.locked < amount {
            return Err(LedgerError::InsufficientAllocated {
                required: amount,
                allocated: self.locked,
            }
            .into());
        }
        self.locked -= amount;
        self.available += amount;
        Ok(())
    }

    /// Pay locked collateral out of the pool entirely (settlement)
    pub fn consume_locked(&mut self, amount: Decimal) -> Result<()> {
        if self.locked < amount {
            return Err(LedgerError::InsufficientAllocated {
                required: amount,
                allocated: self.locked,
            }
            .into());
        }
        self.locked -= amount;
        self.total -= amount;
        Ok(())
    }
}

impl std::fmt::Display for AssetBalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AssetBalance(total={}, available={}, locked={})",
            self.total, self.available, self.locked
        )
    }
}
