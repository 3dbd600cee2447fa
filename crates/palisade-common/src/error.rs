//! Error types for the Palisade engine
//!
//! Provides a unified error type, domain-specific error variants, and a
//! six-class taxonomy so callers can distinguish business-logic failures
//! from infrastructure failures without matching on every variant.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::ids::{AssetId, BlockHeight, ComponentId, PolicyId, ProviderId, TierName};

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Coarse error classification
///
/// Every [`EngineError`] maps to exactly one class. `DependencyUnavailable`
/// is the only class a caller may reasonably retry; all others are
/// deterministic rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller not present in the service directory's authorized set
    Authorization,
    /// Missing policy/provider/tier/asset/allocation record
    NotFound,
    /// Policy already settled, premium already distributed, asset already
    /// initialized
    AlreadyFinalized,
    /// Insufficient balance, exposure limit exceeded, no eligible providers
    Capacity,
    /// Non-positive amount, unknown/inactive tier, unsupported asset
    Validation,
    /// A collaborating component reference is unconfigured or unreachable
    DependencyUnavailable,
}

/// Unified error type for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Tier error: {0}")]
    Tier(#[from] TierError),

    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Premium error: {0}")]
    Premium(#[from] PremiumError),

    #[error("Caller {0} is not in the authorized component set")]
    Unauthorized(ComponentId),

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Classify this error into the coarse taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Ledger(e) => e.kind(),
            EngineError::Tier(e) => e.kind(),
            EngineError::Allocation(e) => e.kind(),
            EngineError::Settlement(e) => e.kind(),
            EngineError::Premium(e) => e.kind(),
            EngineError::Unauthorized(_) => ErrorKind::Authorization,
            EngineError::DependencyUnavailable(_) => ErrorKind::DependencyUnavailable,
            EngineError::Config(_) => ErrorKind::Validation,
        }
    }

    /// Whether a caller may retry this operation after backoff
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::DependencyUnavailable
    }
}

/// Capital ledger errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Asset {0} is not initialized")]
    AssetNotFound(AssetId),

    #[error("Asset {0} is already initialized")]
    AssetAlreadyInitialized(AssetId),

    #[error("No balance record for provider {provider} in asset {asset}")]
    ProviderNotFound { provider: ProviderId, asset: AssetId },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Insufficient available balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("Insufficient allocated balance: required {required}, allocated {allocated}")]
    InsufficientAllocated {
        required: Decimal,
        allocated: Decimal,
    },

    #[error("No earned premiums to claim for provider {provider} in asset {asset}")]
    NothingToClaim { provider: ProviderId, asset: AssetId },

    #[error("Insufficient pending premiums: required {required}, pending {pending}")]
    InsufficientPending { required: Decimal, pending: Decimal },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AssetNotFound(_) | LedgerError::ProviderNotFound { .. } => {
                ErrorKind::NotFound
            }
            LedgerError::AssetAlreadyInitialized(_) => ErrorKind::AlreadyFinalized,
            LedgerError::InvalidAmount => ErrorKind::Validation,
            LedgerError::InsufficientBalance { .. }
            | LedgerError::InsufficientAllocated { .. }
            | LedgerError::InsufficientPending { .. } => ErrorKind::Capacity,
            LedgerError::NothingToClaim { .. } => ErrorKind::Validation,
        }
    }
}

/// Risk tier catalog errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TierError {
    #[error("Unknown risk tier: {0}")]
    InvalidTier(TierName),

    #[error("Risk tier {0} is inactive")]
    TierInactive(TierName),

    #[error("Collateral ratio for tier {tier} is non-positive: {ratio_bps} bps")]
    NonPositiveRatio { tier: TierName, ratio_bps: i64 },

    #[error("Tier parameter source unreachable: {0}")]
    SourceUnavailable(String),
}

impl TierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TierError::InvalidTier(_) => ErrorKind::NotFound,
            TierError::TierInactive(_) | TierError::NonPositiveRatio { .. } => ErrorKind::Validation,
            TierError::SourceUnavailable(_) => ErrorKind::DependencyUnavailable,
        }
    }
}

/// Allocation engine errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AllocationError {
    #[error("No allocations found for policy {0}")]
    NoAllocationsFound(PolicyId),

    #[error("Policy {0} already has locked collateral")]
    AlreadyLocked(PolicyId),

    #[error("Policy {0} already had its collateral released")]
    AlreadyReleased(PolicyId),

    #[error("No eligible providers for policy {policy} (required {required})")]
    NoEligibleProviders { policy: PolicyId, required: Decimal },

    #[error(
        "Exposure limit exceeded for provider {provider} at height {expiration}: \
         adding {share} would bring exposure to {resulting} over limit {limit}"
    )]
    ExposureLimitExceeded {
        provider: ProviderId,
        expiration: BlockHeight,
        share: Decimal,
        resulting: Decimal,
        limit: Decimal,
    },

    #[error("Required collateral must be positive")]
    InvalidAmount,
}

impl AllocationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AllocationError::NoAllocationsFound(_) => ErrorKind::NotFound,
            AllocationError::AlreadyLocked(_) | AllocationError::AlreadyReleased(_) => {
                ErrorKind::AlreadyFinalized
            }
            AllocationError::NoEligibleProviders { .. }
            | AllocationError::ExposureLimitExceeded { .. } => ErrorKind::Capacity,
            AllocationError::InvalidAmount => ErrorKind::Validation,
        }
    }
}

/// Settlement engine errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SettlementError {
    #[error("Policy {0} is already settled")]
    AlreadySettled(PolicyId),

    #[error("Settlement amount must be positive")]
    InvalidAmount,

    #[error("Settlement share mismatch for policy {policy}: distributed {distributed}, expected {expected}")]
    ShareMismatch {
        policy: PolicyId,
        distributed: Decimal,
        expected: Decimal,
    },
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::AlreadySettled(_) => ErrorKind::AlreadyFinalized,
            SettlementError::InvalidAmount => ErrorKind::Validation,
            SettlementError::ShareMismatch { .. } => ErrorKind::Validation,
        }
    }
}

/// Premium distribution errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PremiumError {
    #[error("Premium already recorded for policy {0}")]
    AlreadyRecorded(PolicyId),

    #[error("Premium for policy {0} is already distributed")]
    AlreadyDistributed(PolicyId),

    #[error("No premium record found for policy {0}")]
    RecordNotFound(PolicyId),

    #[error("Premium amount must be positive")]
    InvalidAmount,
}

impl PremiumError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PremiumError::AlreadyRecorded(_) | PremiumError::AlreadyDistributed(_) => {
                ErrorKind::AlreadyFinalized
            }
            PremiumError::RecordNotFound(_) => ErrorKind::NotFound,
            PremiumError::InvalidAmount => ErrorKind::Validation,
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_display() {
        let err = EngineError::Ledger(LedgerError::AssetNotFound(AssetId::from("sBTC")));
        assert!(err.to_string().contains("sBTC"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            EngineError::from(LedgerError::InsufficientBalance {
                required: dec!(1001),
                available: dec!(1000),
            })
            .kind(),
            ErrorKind::Capacity
        );
        assert_eq!(
            EngineError::from(SettlementError::AlreadySettled(PolicyId::from("pol-1"))).kind(),
            ErrorKind::AlreadyFinalized
        );
        assert_eq!(
            EngineError::Unauthorized(ComponentId::from("rogue")).kind(),
            ErrorKind::Authorization
        );
    }

    #[test]
    fn test_retryable() {
        let err = EngineError::from(TierError::SourceUnavailable("oracle down".to_string()));
        assert!(err.is_retryable());

        let err = EngineError::from(AllocationError::InvalidAmount);
        assert!(!err.is_retryable());
    }
}
