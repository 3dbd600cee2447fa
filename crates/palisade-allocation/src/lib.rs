//! # Palisade Allocation
//!
//! Selects providers to back a policy's required collateral, locks and
//! releases that collateral, and maintains per-expiration aggregate
//! exposure (overall, per asset, per risk tier).
//!
//! ## Allocation lifecycle
//!
//! ```text
//! Unallocated -> Locked -> Released   (winning policy)
//!                       -> Consumed   (settlement)
//! ```
//!
//! Locking an already-locked policy and releasing twice are rejected.
//! `lock_collateral` is all-or-nothing: every selected provider's balance
//! and exposure checks must pass before any record is touched.

pub mod engine;
pub mod records;
pub mod strategy;

pub use engine::AllocationEngine;
pub use records::{ExpirationNeed, LiquidityTable, PolicyAllocation, PolicyLock, TierSnapshot};
pub use strategy::{
    CandidateProvider, CapacityWeightedStrategy, EvenSplitStrategy, ProviderShare,
    SelectionStrategy,
};
