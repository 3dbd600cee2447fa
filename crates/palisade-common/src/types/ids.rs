//! Identifier newtypes
//!
//! Every record in the engine is addressed by one or more of these keys.
//! They are thin string wrappers so they can round-trip through serde and
//! external registries unchanged, while keeping the composite map keys
//! (provider × asset, provider × policy, tier pair) type-checked.

use serde::{Deserialize, Serialize};

/// Block height used for policy expirations and settlement records
pub type BlockHeight = u64;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Identifier of a supported collateral asset (e.g. "uSTX", "sBTC")
    AssetId
}

string_id! {
    /// Identifier of a protection policy, originated by the policy
    /// lifecycle service
    PolicyId
}

string_id! {
    /// Identifier of a capital provider
    ProviderId
}

string_id! {
    /// Named risk tier (e.g. "balanced", "aggressive", "crash-insurance")
    TierName
}

string_id! {
    /// Identity of a calling component, checked against the service
    /// directory before every mutating operation
    ComponentId
}
