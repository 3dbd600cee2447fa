//! # Palisade Settlement
//!
//! Pays a concluded, loss-making policy's owner out of its providers'
//! locked collateral. Each provider contributes a floor-rounded share
//! proportional to its allocation; the rounding remainder goes to the
//! largest allocator so the shares reconstruct the settlement amount
//! exactly. Settlement is terminal and idempotent per policy.

pub mod engine;
pub mod records;
pub mod status;

pub use engine::SettlementEngine;
pub use records::{SettlementImpact, SettlementRecord};
pub use status::{AllValidStatusSource, ProviderStatusSource};
