//! Tier catalog
//!
//! Caching front for the external tier parameter source. Parameter lookups
//! are served from a local cache; a miss pulls from the source. Tier
//! compatibility answers are cached per (buyer, provider) pair and fall
//! back to the static pairing when the source is unreachable.

use std::sync::Arc;

use dashmap::DashMap;
use palisade_common::{apply_bps, Result, TierError, TierName};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::params::RiskTierParams;
use crate::source::{fallback_pairing, TierParameterSource};

/// Locally-cached view of the tier parameter source
pub struct TierCatalog {
    source: Arc<dyn TierParameterSource>,
    cache: DashMap<TierName, RiskTierParams>,
    compatibility: DashMap<(TierName, TierName), bool>,
}

impl TierCatalog {
    pub fn new(source: Arc<dyn TierParameterSource>) -> Self {
        Self {
            source,
            cache: DashMap::new(),
            compatibility: DashMap::new(),
        }
    }

    /// Fetch a tier's parameters, refreshing the cache on a miss
    pub fn params(&self, tier: &TierName) -> Result<RiskTierParams> {
        if let Some(cached) = self.cache.get(tier) {
            return Ok(cached.clone());
        }
        self.refresh(tier)
    }

    /// Force-refresh one tier from the source
    pub fn refresh(&self, tier: &TierName) -> Result<RiskTierParams> {
        match self.source.fetch(tier)? {
            Some(params) => {
                debug!(tier = %tier, "Tier parameters refreshed");
                self.cache.insert(tier.clone(), params.clone());
                Ok(params)
            }
            None => Err(TierError::InvalidTier(tier.clone()).into()),
        }
    }

    /// Drop all cached parameters and compatibility answers
    pub fn invalidate(&self) {
        self.cache.clear();
        self.compatibility.clear();
    }

    /// Fail unless the tier exists and is active
    pub fn ensure_tier_active(&self, tier: &TierName) -> Result<()> {
        let params = self.params(tier)?;
        if !params.active {
            return Err(TierError::TierInactive(tier.clone()).into());
        }
        Ok(())
    }

    /// Collateral ratio in basis points for an active tier
    pub fn collateral_ratio_bps(&self, tier: &TierName) -> Result<i64> {
        self.ensure_tier_active(tier)?;
        Ok(self.params(tier)?.collateral_ratio_bps)
    }

    /// Maximum exposure percentage (basis points) for an active tier
    pub fn max_exposure_bps(&self, tier: &TierName) -> Result<u32> {
        self.ensure_tier_active(tier)?;
        Ok(self.params(tier)?.max_exposure_bps)
    }

    /// Premium-adjustment weight (basis points) for a tier
    pub fn premium_multiplier_bps(&self, tier: &TierName) -> Result<u32> {
        Ok(self.params(tier)?.premium_multiplier_bps)
    }

    /// Collateral required to back `protection_amount` at a tier:
    /// `protection_amount × collateral_ratio / 10_000`
    pub fn required_collateral(
        &self,
        protection_amount: Decimal,
        tier: &TierName,
    ) -> Result<Decimal> {
        let ratio_bps = self.collateral_ratio_bps(tier)?;
        if ratio_bps <= 0 {
            return Err(TierError::NonPositiveRatio {
                tier: tier.clone(),
                ratio_bps,
            }
            .into());
        }
        Ok(apply_bps(protection_amount, ratio_bps as u32))
    }

    /// Whether a provider tier may back a buyer tier
    ///
    /// Served from the compatibility cache; computed from tier parameters
    /// on a miss. If the parameter source is unreachable the static
    /// fallback pairing decides instead (and the answer is not cached, so
    /// the dynamic rule takes over once the source recovers).
    pub fn is_compatible(&self, buyer: &TierName, provider: &TierName) -> Result<bool> {
        let key = (buyer.clone(), provider.clone());
        if let Some(cached) = self.compatibility.get(&key) {
            return Ok(*cached);
        }

        match self.dynamic_compatibility(buyer, provider) {
            Ok(compatible) => {
                self.compatibility.insert(key, compatible);
                Ok(compatible)
            }
            Err(err) if err.is_retryable() => {
                warn!(
                    buyer = %buyer,
                    provider = %provider,
                    error = %err,
                    "Tier parameter source unreachable, using static fallback pairing"
                );
                Ok(fallback_pairing(buyer).as_ref() == Some(provider))
            }
            Err(err) => Err(err),
        }
    }

    fn dynamic_compatibility(&self, buyer: &TierName, provider: &TierName) -> Result<bool> {
        let buyer_params = self.params(buyer)?;
        let provider_params = self.params(provider)?;
        Ok(RiskTierParams::accepts(&buyer_params, &provider_params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticTierSource;
    use palisade_common::{EngineError, ErrorKind};
    use rust_decimal_macros::dec;

    struct UnreachableSource;

    impl TierParameterSource for UnreachableSource {
        fn fetch(&self, _tier: &TierName) -> Result<Option<RiskTierParams>> {
            Err(TierError::SourceUnavailable("governance oracle down".to_string()).into())
        }
    }

    fn catalog() -> TierCatalog {
        TierCatalog::new(Arc::new(StaticTierSource::with_defaults()))
    }

    #[test]
    fn test_unknown_tier_is_typed_error() {
        let catalog = catalog();
        let err = catalog
            .collateral_ratio_bps(&TierName::from("nope"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Tier(TierError::InvalidTier(_))));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_inactive_tier_rejected() {
        let source = Arc::new(StaticTierSource::with_defaults());
        source.set_active(&TierName::from("balanced"), false);
        let catalog = TierCatalog::new(source);

        let err = catalog
            .required_collateral(dec!(1000), &TierName::from("balanced"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Tier(TierError::TierInactive(_))));
    }

    #[test]
    fn test_required_collateral() {
        let catalog = catalog();
        // balanced = 150% collateral ratio
        let required = catalog
            .required_collateral(dec!(1000), &TierName::from("balanced"))
            .unwrap();
        assert_eq!(required, dec!(1500));
    }

    #[test]
    fn test_compatibility_dynamic_rule() {
        let catalog = catalog();
        // standard (level 50) is covered by balanced (tolerance 60) and
        // aggressive (90) but not conservative (30)
        assert!(catalog
            .is_compatible(&TierName::from("standard"), &TierName::from("balanced"))
            .unwrap());
        assert!(catalog
            .is_compatible(&TierName::from("standard"), &TierName::from("aggressive"))
            .unwrap());
        assert!(!catalog
            .is_compatible(&TierName::from("standard"), &TierName::from("conservative"))
            .unwrap());
    }

    #[test]
    fn test_compatibility_cached() {
        let source = Arc::new(StaticTierSource::with_defaults());
        let catalog = TierCatalog::new(Arc::clone(&source) as Arc<dyn TierParameterSource>);

        assert!(catalog
            .is_compatible(&TierName::from("flexible"), &TierName::from("aggressive"))
            .unwrap());

        // Removing the tiers upstream does not change the cached answer
        source.remove(&TierName::from("flexible"));
        source.remove(&TierName::from("aggressive"));
        assert!(catalog
            .is_compatible(&TierName::from("flexible"), &TierName::from("aggressive"))
            .unwrap());
    }

    #[test]
    fn test_fallback_pairing_when_source_unreachable() {
        let catalog = TierCatalog::new(Arc::new(UnreachableSource));

        assert!(catalog
            .is_compatible(&TierName::from("standard"), &TierName::from("balanced"))
            .unwrap());
        assert!(!catalog
            .is_compatible(&TierName::from("standard"), &TierName::from("aggressive"))
            .unwrap());
    }

    #[test]
    fn test_parameter_lookup_source_unreachable_is_retryable() {
        let catalog = TierCatalog::new(Arc::new(UnreachableSource));
        let err = catalog.params(&TierName::from("balanced")).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_refresh_picks_up_changes() {
        let source = Arc::new(StaticTierSource::with_defaults());
        let catalog = TierCatalog::new(Arc::clone(&source) as Arc<dyn TierParameterSource>);

        let balanced = TierName::from("balanced");
        assert_eq!(catalog.params(&balanced).unwrap().collateral_ratio_bps, 15_000);

        let mut updated = catalog.params(&balanced).unwrap();
        updated.collateral_ratio_bps = 16_000;
        source.upsert(updated);

        // Cache still serves the old value until refreshed
        assert_eq!(catalog.params(&balanced).unwrap().collateral_ratio_bps, 15_000);
        catalog.refresh(&balanced).unwrap();
        assert_eq!(catalog.params(&balanced).unwrap().collateral_ratio_bps, 16_000);
    }
}
