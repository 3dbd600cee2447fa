//! # Palisade Ledger
//!
//! Per-asset and per-provider balance bookkeeping for the Palisade engine.
//!
//! ## Accounting model
//!
//! ```text
//! AssetBalance:    total     = available + locked
//! ProviderBalance: deposited = available + allocated
//! ```
//!
//! Premiums are tracked separately (pending and earned balances) and are
//! never drawn from principal. All balance mutations are atomic: every
//! operation validates all of its preconditions before applying any paired
//! increments and decrements.

pub mod asset;
pub mod ledger;
pub mod provider;

pub use asset::AssetBalance;
pub use ledger::{AssetRecord, CapitalLedger};
pub use provider::ProviderBalance;
