//! # Palisade Tiers
//!
//! Risk tier catalog: named parameter sets controlling collateral ratios,
//! premium weighting, exposure limits, and buyer/provider compatibility.
//!
//! Tier parameters are configured externally and served from a local cache
//! with explicit refresh; a lookup miss triggers a refresh from the
//! parameter source. Compatibility between a buyer tier and a provider tier
//! is computed on demand from the tier parameters and cached; a static
//! fallback mapping covers the case where the parameter source is
//! unreachable.

pub mod catalog;
pub mod params;
pub mod source;

pub use catalog::TierCatalog;
pub use params::{RiskTierParams, TierKind};
pub use source::{StaticTierSource, TierParameterSource};
