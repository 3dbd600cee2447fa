//! Provider validity during settlement
//!
//! A provider selected at lock time may no longer be reachable or valid
//! when the policy settles. The status source answers that question at
//! settlement time; a dropped provider's share is redistributed over the
//! remaining contributors instead of aborting the payout.

use palisade_common::ProviderId;

/// Answers whether a provider can still honor its settlement share
pub trait ProviderStatusSource: Send + Sync {
    fn is_valid(&self, provider: &ProviderId) -> bool;
}

/// Default status source: every provider is valid
pub struct AllValidStatusSource;

impl ProviderStatusSource for AllValidStatusSource {
    fn is_valid(&self, _provider: &ProviderId) -> bool {
        true
    }
}
