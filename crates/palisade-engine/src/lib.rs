//! # Palisade Engine
//!
//! Facade over the Palisade components: the capital ledger, the risk tier
//! catalog, collateral allocation, settlement, and premium distribution.
//! Construct a [`ProtectionEngine`], authorize the calling components in
//! its [`ServiceDirectory`], and drive the policy lifecycle through its
//! operation surface.
//!
//! ```no_run
//! use palisade_common::ComponentId;
//! use palisade_engine::{EngineConfig, ProtectionEngine};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = EngineConfig::load()?;
//! let engine = ProtectionEngine::with_defaults(config);
//! engine
//!     .directory()
//!     .authorize(ComponentId::new("policy-lifecycle"));
//! # Ok(())
//! # }
//! ```
//!
//! [`ServiceDirectory`]: palisade_common::ServiceDirectory

pub mod config;
pub mod facade;

pub use config::{AllocationSettings, EngineConfig, PremiumSettings, StrategyChoice};
pub use facade::ProtectionEngine;
