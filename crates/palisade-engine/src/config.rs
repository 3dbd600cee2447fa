//! Engine configuration
//!
//! Built once at startup and handed to [`ProtectionEngine::new`]; nothing
//! reads the environment after construction.
//!
//! [`ProtectionEngine::new`]: crate::ProtectionEngine::new

use anyhow::Result;
use palisade_premium::{SweepPolicy, SweepSettings};
use serde::{Deserialize, Serialize};

/// Protection engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Allocation configuration
    pub allocation: AllocationSettings,
    /// Premium distribution configuration
    pub premium: PremiumSettings,
    /// Unclaimed-premium sweep configuration
    pub sweep: SweepSettings,
}

impl EngineConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        if let Ok(val) = std::env::var("PALISADE_ALLOCATION_STRATEGY") {
            if let Some(choice) = StrategyChoice::parse(&val) {
                cfg.allocation.strategy = choice;
            }
        }
        if let Ok(val) = std::env::var("PALISADE_MAX_PROVIDERS_PER_POLICY") {
            if let Ok(v) = val.parse() {
                cfg.allocation.max_providers_per_policy = v;
            }
        }

        if let Ok(val) = std::env::var("PALISADE_TIER_WEIGHTED_DISTRIBUTION") {
            if let Ok(v) = val.parse() {
                cfg.premium.tier_weighted_distribution = v;
            }
        }

        // Sweep settings
        if let Ok(val) = std::env::var("PALISADE_SWEEP_AGE_THRESHOLD_MS") {
            if let Ok(v) = val.parse() {
                cfg.sweep.age_threshold_ms = v;
            }
        }
        if let Ok(val) = std::env::var("PALISADE_SWEEP_POLICY") {
            match val.as_str() {
                "redistribute_to_active" => cfg.sweep.policy = SweepPolicy::RedistributeToActive,
                "forward_to_treasury" => cfg.sweep.policy = SweepPolicy::ForwardToTreasury,
                _ => {}
            }
        }
        if let Ok(val) = std::env::var("PALISADE_TREASURY_ACCOUNT") {
            cfg.sweep.treasury_account = val;
        }

        Ok(cfg)
    }
}

/// Allocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSettings {
    /// Provider selection strategy
    pub strategy: StrategyChoice,
    /// Candidate cap for the even-split strategy
    pub max_providers_per_policy: usize,
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            strategy: StrategyChoice::EvenSplit,
            max_providers_per_policy: 5,
        }
    }
}

/// Premium distribution configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PremiumSettings {
    /// Weight premium shares by the provider tier's premium multiplier
    pub tier_weighted_distribution: bool,
}

/// Which provider selection strategy the allocation engine runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyChoice {
    EvenSplit,
    CapacityWeighted,
}

impl StrategyChoice {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "even_split" => Some(StrategyChoice::EvenSplit),
            "capacity_weighted" => Some(StrategyChoice::CapacityWeighted),
            _ => None,
        }
    }
}
