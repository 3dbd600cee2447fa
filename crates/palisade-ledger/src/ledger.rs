//! Capital ledger
//!
//! Keyed record store for asset and provider balances. The ledger owns the
//! bookkeeping only; which providers back which policy is the allocation
//! engine's concern. Engines mutate balances through the paired
//! lock/release/consume helpers so asset-level and provider-level records
//! always move together.

use std::collections::HashMap;
use std::sync::Arc;

use palisade_common::{
    AssetId, EventOutbox, LedgerError, LedgerEvent, ProviderId, Result, TierName,
};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::asset::AssetBalance;
use crate::provider::ProviderBalance;

/// A registered collateral asset
#[derive(Debug, Clone)]
pub struct AssetRecord {
    /// Pool-wide balance
    pub balance: AssetBalance,
    /// Opaque reference to the asset's external token contract, if any
    pub external_ref: Option<String>,
}

/// Per-asset and per-provider balance bookkeeping
pub struct CapitalLedger {
    assets: HashMap<AssetId, AssetRecord>,
    providers: HashMap<(ProviderId, AssetId), ProviderBalance>,
    outbox: Arc<EventOutbox>,
}

impl CapitalLedger {
    pub fn new(outbox: Arc<EventOutbox>) -> Self {
        Self {
            assets: HashMap::new(),
            providers: HashMap::new(),
            outbox,
        }
    }

    // ------------------------------ public operations ------------------------------

    /// Register a collateral asset. Fails if already initialized.
    pub fn initialize_asset(
        &mut self,
        asset: AssetId,
        external_ref: Option<String>,
    ) -> Result<()> {
        if self.assets.contains_key(&asset) {
            return Err(LedgerError::AssetAlreadyInitialized(asset).into());
        }
        info!(asset = %asset, "Asset initialized");
        self.assets.insert(
            asset.clone(),
            AssetRecord {
                balance: AssetBalance::new(),
                external_ref: external_ref.clone(),
            },
        );
        self.outbox
            .record(LedgerEvent::AssetInitialized { asset, external_ref });
        Ok(())
    }

    /// Deposit provider capital under a risk tier
    ///
    /// Creates the provider's balance record on first deposit. A later
    /// deposit under a different tier moves the provider to that tier.
    pub fn deposit(
        &mut self,
        provider: &ProviderId,
        amount: Decimal,
        asset: &AssetId,
        tier: &TierName,
    ) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount.into());
        }
        let record = self
            .assets
            .get_mut(asset)
            .ok_or_else(|| LedgerError::AssetNotFound(asset.clone()))?;

        let balance = self
            .providers
            .entry((provider.clone(), asset.clone()))
            .or_insert_with(|| ProviderBalance::new(tier.clone()));
        balance.tier = tier.clone();
        balance.credit(amount)?;
        record.balance.deposit(amount)?;

        debug!(provider = %provider, asset = %asset, %amount, tier = %tier, "Deposit recorded");
        self.outbox.record(LedgerEvent::DepositRecorded {
            provider: provider.clone(),
            asset: asset.clone(),
            amount,
            tier: tier.clone(),
        });
        Ok(())
    }

    /// Withdraw provider capital from its available balance
    pub fn withdraw(
        &mut self,
        provider: &ProviderId,
        amount: Decimal,
        asset: &AssetId,
    ) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount.into());
        }
        if !self.assets.contains_key(asset) {
            return Err(LedgerError::AssetNotFound(asset.clone()).into());
        }
        let balance = self.provider_mut(provider, asset)?;
        balance.withdraw(amount)?;
        // Provider check passed, the asset-level mirror cannot fail
        self.asset_mut(asset)?.balance.withdraw(amount)?;

        debug!(provider = %provider, asset = %asset, %amount, "Withdrawal recorded");
        self.outbox.record(LedgerEvent::WithdrawalRecorded {
            provider: provider.clone(),
            asset: asset.clone(),
            amount,
        });
        Ok(())
    }

    /// Transfer a provider's earned premium balance out, zeroing it
    pub fn claim_earned_premiums(
        &mut self,
        provider: &ProviderId,
        asset: &AssetId,
    ) -> Result<Decimal> {
        let balance = self.provider_mut(provider, asset)?;
        if balance.earned_premiums <= Decimal::ZERO {
            return Err(LedgerError::NothingToClaim {
                provider: provider.clone(),
                asset: asset.clone(),
            }
            .into());
        }
        let claimed = balance.claim_earned();

        info!(provider = %provider, asset = %asset, amount = %claimed, "Earned premiums claimed");
        self.outbox.record(LedgerEvent::PremiumsClaimed {
            provider: provider.clone(),
            asset: asset.clone(),
            amount: claimed,
        });
        Ok(claimed)
    }

    // ------------------------- engine-facing mutations -------------------------
    //
    // These move provider and asset records together and emit no events;
    // the calling engine records the summary event for its own operation.

    /// Move a provider's capital from available to allocated
    pub fn lock_collateral(
        &mut self,
        provider: &ProviderId,
        asset: &AssetId,
        amount: Decimal,
    ) -> Result<()> {
        self.provider_mut(provider, asset)?.allocate(amount)?;
        self.asset_mut(asset)?.balance.lock(amount)?;
        Ok(())
    }

    /// Move a provider's capital from allocated back to available
    pub fn release_collateral(
        &mut self,
        provider: &ProviderId,
        asset: &AssetId,
        amount: Decimal,
    ) -> Result<()> {
        self.provider_mut(provider, asset)?.release(amount)?;
        self.asset_mut(asset)?.balance.unlock(amount)?;
        Ok(())
    }

    /// Deduct a settlement share: the capital leaves the pool
    pub fn consume_allocated(
        &mut self,
        provider: &ProviderId,
        asset: &AssetId,
        amount: Decimal,
    ) -> Result<()> {
        self.provider_mut(provider, asset)?.consume_allocated(amount)?;
        self.asset_mut(asset)?.balance.consume_locked(amount)?;
        Ok(())
    }

    /// Accrue a pending premium share for a provider
    pub fn accrue_pending_premium(
        &mut self,
        provider: &ProviderId,
        asset: &AssetId,
        amount: Decimal,
    ) -> Result<()> {
        self.provider_mut(provider, asset)?.accrue_pending(amount);
        Ok(())
    }

    /// Convert a provider's pending premium share into earned balance
    pub fn pending_to_earned(
        &mut self,
        provider: &ProviderId,
        asset: &AssetId,
        amount: Decimal,
    ) -> Result<()> {
        self.provider_mut(provider, asset)?.pending_to_earned(amount)
    }

    /// Zero a provider's premium balances, returning the swept amount
    pub fn sweep_premiums(&mut self, provider: &ProviderId, asset: &AssetId) -> Result<Decimal> {
        Ok(self.provider_mut(provider, asset)?.sweep_premiums())
    }

    /// Credit a redistributed amount straight to a provider's earned balance
    pub fn credit_earned(
        &mut self,
        provider: &ProviderId,
        asset: &AssetId,
        amount: Decimal,
    ) -> Result<()> {
        let balance = self.provider_mut(provider, asset)?;
        balance.accrue_pending(amount);
        balance.pending_to_earned(amount)
    }

    // ------------------------------- lookups -------------------------------

    /// Whether an asset has been initialized
    pub fn is_asset_initialized(&self, asset: &AssetId) -> bool {
        self.assets.contains_key(asset)
    }

    /// Pool-wide balance for an asset
    pub fn asset_balance(&self, asset: &AssetId) -> Result<&AssetBalance> {
        self.assets
            .get(asset)
            .map(|record| &record.balance)
            .ok_or_else(|| LedgerError::AssetNotFound(asset.clone()).into())
    }

    /// A provider's balance record in an asset
    pub fn provider_balance(
        &self,
        provider: &ProviderId,
        asset: &AssetId,
    ) -> Result<&ProviderBalance> {
        self.providers
            .get(&(provider.clone(), asset.clone()))
            .ok_or_else(|| {
                LedgerError::ProviderNotFound {
                    provider: provider.clone(),
                    asset: asset.clone(),
                }
                .into()
            })
    }

    /// All providers holding a balance record in an asset
    pub fn providers_in_asset<'a>(
        &'a self,
        asset: &'a AssetId,
    ) -> impl Iterator<Item = (&'a ProviderId, &'a ProviderBalance)> + 'a {
        self.providers
            .iter()
            .filter(move |((_, a), _)| a == asset)
            .map(|((p, _), balance)| (p, balance))
    }

    fn provider_mut(
        &mut self,
        provider: &ProviderId,
        asset: &AssetId,
    ) -> Result<&mut ProviderBalance> {
        self.providers
            .get_mut(&(provider.clone(), asset.clone()))
            .ok_or_else(|| {
                LedgerError::ProviderNotFound {
                    provider: provider.clone(),
                    asset: asset.clone(),
                }
                .into()
            })
    }

    fn asset_mut(&mut self, asset: &AssetId) -> Result<&mut AssetRecord> {
        self.assets
            .get_mut(asset)
            .ok_or_else(|| LedgerError::AssetNotFound(asset.clone()).into())
    }
}
