//! # Palisade Common
//!
//! Shared types, errors, and infrastructure for the Palisade capital
//! allocation engine.
//!
//! ## Core Types
//!
//! - [`types::ids`]: Newtype identifiers for assets, policies, providers,
//!   tiers, and components
//! - [`ServiceDirectory`]: Authorized-caller set consulted before every
//!   mutating operation
//! - [`EventOutbox`]: Structured, appendable audit event log with pluggable
//!   sinks
//! - [`EngineError`]: Unified error type with a six-class taxonomy
//!   ([`ErrorKind`])

pub mod directory;
pub mod error;
pub mod events;
pub mod math;
pub mod types;

// Re-export commonly used types at crate root
pub use directory::ServiceDirectory;
pub use error::{
    AllocationError, EngineError, ErrorKind, LedgerError, PremiumError, Result, SettlementError,
    TierError,
};
pub use events::{EventEnvelope, EventOutbox, EventSink, LedgerEvent, SweepDestination, TracingSink};
pub use math::proportional_shares;
pub use types::ids::{AssetId, BlockHeight, ComponentId, PolicyId, ProviderId, TierName};

use rust_decimal::Decimal;

/// Palisade version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Basis point denominator: ratios and percentages are carried as basis
/// points throughout the engine (10_000 bps = 100%)
pub const BPS_DENOM: u32 = 10_000;

/// Apply a basis-point ratio to an amount
#[inline]
pub fn apply_bps(amount: Decimal, bps: u32) -> Decimal {
    amount * Decimal::from(bps) / Decimal::from(BPS_DENOM)
}
