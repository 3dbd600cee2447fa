//! Tier parameter sources
//!
//! Tier parameters live outside the engine (governance-controlled
//! configuration); the catalog pulls them through this trait. The bundled
//! [`StaticTierSource`] carries the default tier set and doubles as the
//! in-memory source for tests.

use std::collections::HashMap;

use palisade_common::{Result, TierName};
use parking_lot::RwLock;

use crate::params::{RiskTierParams, TierKind};

/// External parameter source consulted on cache misses and refreshes
pub trait TierParameterSource: Send + Sync {
    /// Fetch one tier's parameters. `Ok(None)` means the tier does not
    /// exist; `Err` means the source itself is unreachable.
    fn fetch(&self, tier: &TierName) -> Result<Option<RiskTierParams>>;
}

/// In-memory parameter source seeded with the default tier set
pub struct StaticTierSource {
    tiers: RwLock<HashMap<TierName, RiskTierParams>>,
}

impl StaticTierSource {
    /// Source with the default buyer and provider tiers
    pub fn with_defaults() -> Self {
        let source = Self {
            tiers: RwLock::new(HashMap::new()),
        };
        for params in default_tiers() {
            source.upsert(params);
        }
        source
    }

    /// Empty source
    pub fn empty() -> Self {
        Self {
            tiers: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace a tier definition
    pub fn upsert(&self, params: RiskTierParams) {
        self.tiers.write().insert(params.name.clone(), params);
    }

    /// Remove a tier definition
    pub fn remove(&self, tier: &TierName) {
        self.tiers.write().remove(tier);
    }

    /// Flip a tier's active flag, if it exists
    pub fn set_active(&self, tier: &TierName, active: bool) {
        if let Some(params) = self.tiers.write().get_mut(tier) {
            params.active = active;
        }
    }
}

impl TierParameterSource for StaticTierSource {
    fn fetch(&self, tier: &TierName) -> Result<Option<RiskTierParams>> {
        Ok(self.tiers.read().get(tier).cloned())
    }
}

/// The default tier set
///
/// Provider tiers trade collateral ratio against premium weight: a
/// conservative provider posts more collateral per unit of protection and
/// earns a smaller premium multiplier, an aggressive one the reverse.
pub fn default_tiers() -> Vec<RiskTierParams> {
    vec![
        // Provider-facing tiers
        RiskTierParams {
            name: TierName::from("conservative"),
            kind: TierKind::Provider,
            collateral_ratio_bps: 20_000,
            premium_multiplier_bps: 8_000,
            max_exposure_bps: 2_500,
            active: true,
            protection_level: 0,
            risk_tolerance: 30,
        },
        RiskTierParams {
            name: TierName::from("balanced"),
            kind: TierKind::Provider,
            collateral_ratio_bps: 15_000,
            premium_multiplier_bps: 10_000,
            max_exposure_bps: 5_000,
            active: true,
            protection_level: 0,
            risk_tolerance: 60,
        },
        RiskTierParams {
            name: TierName::from("aggressive"),
            kind: TierKind::Provider,
            collateral_ratio_bps: 11_000,
            premium_multiplier_bps: 12_500,
            max_exposure_bps: 7_500,
            active: true,
            protection_level: 0,
            risk_tolerance: 90,
        },
        // Buyer-facing tiers
        RiskTierParams {
            name: TierName::from("buyer-conservative"),
            kind: TierKind::Buyer,
            collateral_ratio_bps: 20_000,
            premium_multiplier_bps: 10_000,
            max_exposure_bps: 0,
            active: true,
            protection_level: 30,
            risk_tolerance: 0,
        },
        RiskTierParams {
            name: TierName::from("standard"),
            kind: TierKind::Buyer,
            collateral_ratio_bps: 15_000,
            premium_multiplier_bps: 10_000,
            max_exposure_bps: 0,
            active: true,
            protection_level: 50,
            risk_tolerance: 0,
        },
        RiskTierParams {
            name: TierName::from("flexible"),
            kind: TierKind::Buyer,
            collateral_ratio_bps: 12_000,
            premium_multiplier_bps: 10_000,
            max_exposure_bps: 0,
            active: true,
            protection_level: 80,
            risk_tolerance: 0,
        },
        RiskTierParams {
            name: TierName::from("crash-insurance"),
            kind: TierKind::Buyer,
            collateral_ratio_bps: 15_000,
            premium_multiplier_bps: 10_000,
            max_exposure_bps: 0,
            active: true,
            protection_level: 50,
            risk_tolerance: 0,
        },
    ]
}

/// Static buyer-tier to provider-tier pairing used when the dynamic
/// parameter source is unreachable. A simplification: the dynamic rule can
/// match several provider tiers, this mapping names one canonical pair.
pub fn fallback_pairing(buyer: &TierName) -> Option<TierName> {
    match buyer.as_str() {
        "buyer-conservative" => Some(TierName::from("conservative")),
        "standard" => Some(TierName::from("balanced")),
        "flexible" => Some(TierName::from("aggressive")),
        "crash-insurance" => Some(TierName::from("balanced")),
        _ => None,
    }
}
