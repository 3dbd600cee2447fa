//! The protection engine facade
//!
//! Wires the components together once at construction and exposes the
//! full operation surface. Every mutating operation first checks the
//! caller against the service directory, then runs as one serialized
//! state transition; there is no interior concurrency.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use palisade_allocation::{
    AllocationEngine, CapacityWeightedStrategy, EvenSplitStrategy, ExpirationNeed,
    PolicyAllocation, PolicyLock, SelectionStrategy,
};
use palisade_common::{
    AllocationError, AssetId, BlockHeight, ComponentId, EventEnvelope, EventOutbox, PolicyId,
    ProviderId, Result, ServiceDirectory, SettlementError, TierName,
};
use palisade_ledger::{AssetBalance, CapitalLedger, ProviderBalance};
use palisade_premium::{PremiumEngine, PremiumRecord, SweepOutcome};
use palisade_settlement::{
    AllValidStatusSource, ProviderStatusSource, SettlementEngine, SettlementImpact,
    SettlementRecord,
};
use palisade_tiers::{StaticTierSource, TierCatalog, TierParameterSource};
use rust_decimal::Decimal;
use tracing::info;

use crate::config::{EngineConfig, StrategyChoice};

/// Capital allocation, settlement, and premium distribution behind one
/// authorized surface
pub struct ProtectionEngine {
    config: EngineConfig,
    directory: ServiceDirectory,
    outbox: Arc<EventOutbox>,
    ledger: CapitalLedger,
    tiers: TierCatalog,
    allocations: AllocationEngine,
    settlements: SettlementEngine,
    premiums: PremiumEngine,
    /// Policies whose collateral was released; settlement and re-lock are
    /// rejected for these
    released: HashSet<PolicyId>,
    current_height: BlockHeight,
}

impl ProtectionEngine {
    /// Assemble an engine from its injected collaborators
    pub fn new(
        config: EngineConfig,
        tier_source: Arc<dyn TierParameterSource>,
        status_source: Arc<dyn ProviderStatusSource>,
        outbox: Arc<EventOutbox>,
    ) -> Self {
        let strategy = Self::strategy_for(&config);
        info!(strategy = strategy.name(), "Protection engine assembled");
        Self {
            directory: ServiceDirectory::new(),
            ledger: CapitalLedger::new(Arc::clone(&outbox)),
            tiers: TierCatalog::new(tier_source),
            allocations: AllocationEngine::new(strategy),
            settlements: SettlementEngine::new(status_source),
            premiums: PremiumEngine::new(),
            released: HashSet::new(),
            current_height: 0,
            outbox,
            config,
        }
    }

    /// Engine with the default tier set and an all-valid status source
    pub fn with_defaults(config: EngineConfig) -> Self {
        Self::new(
            config,
            Arc::new(StaticTierSource::with_defaults()),
            Arc::new(AllValidStatusSource),
            Arc::new(EventOutbox::new()),
        )
    }

    fn strategy_for(config: &EngineConfig) -> Box<dyn SelectionStrategy> {
        match config.allocation.strategy {
            StrategyChoice::EvenSplit => Box::new(EvenSplitStrategy::new(
                config.allocation.max_providers_per_policy,
            )),
            StrategyChoice::CapacityWeighted => Box::new(CapacityWeightedStrategy),
        }
    }

    // --------------------------- ledger operations ---------------------------

    /// Register a collateral asset
    pub fn initialize_asset(
        &mut self,
        caller: &ComponentId,
        asset: AssetId,
        external_ref: Option<String>,
    ) -> Result<()> {
        self.directory.require(caller)?;
        self.ledger.initialize_asset(asset, external_ref)
    }

    /// Deposit provider capital under a risk tier
    pub fn deposit(
        &mut self,
        caller: &ComponentId,
        provider: &ProviderId,
        amount: Decimal,
        asset: &AssetId,
        tier: &TierName,
    ) -> Result<()> {
        self.directory.require(caller)?;
        self.tiers.ensure_tier_active(tier)?;
        self.ledger.deposit(provider, amount, asset, tier)
    }

    /// Withdraw provider capital from its available balance
    pub fn withdraw(
        &mut self,
        caller: &ComponentId,
        provider: &ProviderId,
        amount: Decimal,
        asset: &AssetId,
    ) -> Result<()> {
        self.directory.require(caller)?;
        self.ledger.withdraw(provider, amount, asset)
    }

    /// Claim a provider's earned premium balance
    pub fn claim_earned_premiums(
        &mut self,
        caller: &ComponentId,
        provider: &ProviderId,
        asset: &AssetId,
    ) -> Result<Decimal> {
        self.directory.require(caller)?;
        self.ledger.claim_earned_premiums(provider, asset)
    }

    // ------------------------- allocation operations -------------------------

    /// Lock provider collateral against a policy
    #[allow(clippy::too_many_arguments)]
    pub fn lock_collateral(
        &mut self,
        caller: &ComponentId,
        policy: &PolicyId,
        amount: Decimal,
        asset: &AssetId,
        tier: &TierName,
        expiration: BlockHeight,
        owner: &str,
    ) -> Result<()> {
        self.directory.require(caller)?;
        self.ensure_not_terminal(policy)?;
        self.allocations.lock_collateral(
            &mut self.ledger,
            &self.tiers,
            &self.outbox,
            policy,
            amount,
            asset,
            tier,
            expiration,
            owner,
        )
    }

    /// Return a winning policy's collateral to its providers
    pub fn release_collateral(
        &mut self,
        caller: &ComponentId,
        policy: &PolicyId,
        asset: &AssetId,
        expiration: BlockHeight,
    ) -> Result<Decimal> {
        self.directory.require(caller)?;
        self.ensure_not_terminal(policy)?;

        // The caller-supplied key must match the lock it refers to
        match self.allocations.lock(policy) {
            Some(lock) if lock.asset == *asset && lock.expiration == expiration => {}
            _ => return Err(AllocationError::NoAllocationsFound(policy.clone()).into()),
        }

        let total = self
            .allocations
            .release_collateral(&mut self.ledger, &self.outbox, policy)?;
        self.released.insert(policy.clone());
        Ok(total)
    }

    /// Idempotently mark an expiration height's liquidity as prepared
    pub fn prepare_liquidity_for_expiration(
        &mut self,
        caller: &ComponentId,
        height: BlockHeight,
    ) -> Result<()> {
        self.directory.require(caller)?;
        self.allocations
            .prepare_liquidity_for_expiration(&self.outbox, height);
        Ok(())
    }

    // ------------------------- settlement operations -------------------------

    /// Settle a losing policy, paying its owner out of locked collateral
    pub fn process_settlement(
        &mut self,
        caller: &ComponentId,
        policy: &PolicyId,
        amount: Decimal,
        asset: &AssetId,
        owner: &str,
    ) -> Result<()> {
        self.directory.require(caller)?;
        if self.released.contains(policy) {
            return Err(AllocationError::AlreadyReleased(policy.clone()).into());
        }
        self.settlements.process_settlement(
            &mut self.ledger,
            &mut self.allocations,
            &self.outbox,
            policy,
            amount,
            asset,
            owner,
            self.current_height,
        )
    }

    // -------------------------- premium operations --------------------------

    /// Record a policy's premium payment, accruing pending provider shares
    #[allow(clippy::too_many_arguments)]
    pub fn record_premium_payment(
        &mut self,
        caller: &ComponentId,
        policy: &PolicyId,
        amount: Decimal,
        asset: &AssetId,
        expiration: BlockHeight,
        owner: &str,
    ) -> Result<()> {
        self.directory.require(caller)?;
        self.premiums.record_premium_payment(
            &mut self.ledger,
            &self.allocations,
            &self.outbox,
            policy,
            amount,
            asset,
            expiration,
            owner,
            self.config.premium.tier_weighted_distribution,
        )
    }

    /// Convert a policy's pending premium shares into earned balance
    pub fn distribute_premium(
        &mut self,
        caller: &ComponentId,
        policy: &PolicyId,
        asset: &AssetId,
    ) -> Result<()> {
        self.directory.require(caller)?;
        self.premiums.distribute_premium(
            &mut self.ledger,
            &self.outbox,
            policy,
            asset,
            self.current_height,
        )
    }

    /// Sweep premiums left unclaimed past the configured age threshold
    pub fn sweep_unclaimed(
        &mut self,
        caller: &ComponentId,
        asset: &AssetId,
    ) -> Result<SweepOutcome> {
        self.directory.require(caller)?;
        self.premiums.sweep_unclaimed(
            &mut self.ledger,
            &self.outbox,
            asset,
            Utc::now().timestamp_millis(),
            &self.config.sweep,
        )
    }

    // ------------------------------ chain clock ------------------------------

    /// Advance the engine's view of the current block height
    pub fn set_current_height(&mut self, caller: &ComponentId, height: BlockHeight) -> Result<()> {
        self.directory.require(caller)?;
        self.current_height = height;
        Ok(())
    }

    pub fn current_height(&self) -> BlockHeight {
        self.current_height
    }

    // ------------------------------- lookups -------------------------------

    pub fn asset_balance(&self, asset: &AssetId) -> Result<&AssetBalance> {
        self.ledger.asset_balance(asset)
    }

    pub fn provider_balance(
        &self,
        provider: &ProviderId,
        asset: &AssetId,
    ) -> Result<&ProviderBalance> {
        self.ledger.provider_balance(provider, asset)
    }

    pub fn allocation(&self, provider: &ProviderId, policy: &PolicyId) -> Option<&PolicyAllocation> {
        self.allocations.allocation(provider, policy)
    }

    pub fn policy_lock(&self, policy: &PolicyId) -> Option<&PolicyLock> {
        self.allocations.lock(policy)
    }

    pub fn exposure(&self, provider: &ProviderId, asset: &AssetId, height: BlockHeight) -> Decimal {
        self.allocations.exposure(provider, asset, height)
    }

    pub fn liquidity_need(&self, height: BlockHeight) -> Option<&ExpirationNeed> {
        self.allocations.liquidity_need(height)
    }

    pub fn asset_requirement(&self, height: BlockHeight, asset: &AssetId) -> Decimal {
        self.allocations.asset_requirement(height, asset)
    }

    pub fn tier_requirement(
        &self,
        height: BlockHeight,
        asset: &AssetId,
        tier: &TierName,
    ) -> Decimal {
        self.allocations.tier_requirement(height, asset, tier)
    }

    pub fn settlement(&self, policy: &PolicyId) -> Option<&SettlementRecord> {
        self.settlements.settlement(policy)
    }

    pub fn settlement_impacts(&self, policy: &PolicyId) -> Option<&[SettlementImpact]> {
        self.settlements.impacts(policy)
    }

    pub fn premium_record(&self, policy: &PolicyId) -> Option<&PremiumRecord> {
        self.premiums.premium_record(policy)
    }

    /// Collateral needed to back `protection_amount` at a tier
    pub fn required_collateral(
        &self,
        protection_amount: Decimal,
        tier: &TierName,
    ) -> Result<Decimal> {
        self.tiers.required_collateral(protection_amount, tier)
    }

    pub fn is_tier_compatible(&self, buyer: &TierName, provider: &TierName) -> Result<bool> {
        self.tiers.is_compatible(buyer, provider)
    }

    /// Authorized-caller set; callers are managed by the operator
    pub fn directory(&self) -> &ServiceDirectory {
        &self.directory
    }

    /// Snapshot of the recorded audit events
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.outbox.events()
    }

    pub fn outbox(&self) -> &Arc<EventOutbox> {
        &self.outbox
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Settle and release are mutually exclusive terminal operations; any
    /// replay against a finalized policy is a typed rejection
    fn ensure_not_terminal(&self, policy: &PolicyId) -> Result<()> {
        if self.settlements.is_settled(policy) {
            return Err(SettlementError::AlreadySettled(policy.clone()).into());
        }
        if self.released.contains(policy) {
            return Err(AllocationError::AlreadyReleased(policy.clone()).into());
        }
        Ok(())
    }
}
