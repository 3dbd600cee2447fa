//! # Palisade Premium
//!
//! Credits providers with their share of a policy's premium income.
//! Premiums accrue as pending at payment time, convert to claimable
//! earned balance at distribution, and are swept after a configurable
//! idle period if the provider never claims them.

pub mod engine;
pub mod records;
pub mod sweep;

pub use engine::PremiumEngine;
pub use records::PremiumRecord;
pub use sweep::{SweepOutcome, SweepPolicy, SweepSettings};
