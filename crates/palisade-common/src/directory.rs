//! Service directory
//!
//! Holds the set of currently-authorized component identities. Every
//! mutating operation on the engine checks its caller against this set
//! before touching any record. The directory is the leaf dependency of the
//! whole system: it never calls into any other component.

use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::types::ids::ComponentId;

/// Authorized-caller set for privileged mutating operations
pub struct ServiceDirectory {
    authorized: RwLock<HashSet<ComponentId>>,
}

impl ServiceDirectory {
    /// Create an empty directory (no caller is authorized)
    pub fn new() -> Self {
        Self {
            authorized: RwLock::new(HashSet::new()),
        }
    }

    /// Create a directory pre-populated with an authorized set
    pub fn with_authorized<I>(components: I) -> Self
    where
        I: IntoIterator<Item = ComponentId>,
    {
        Self {
            authorized: RwLock::new(components.into_iter().collect()),
        }
    }

    /// Add a component to the authorized set
    pub fn authorize(&self, component: ComponentId) {
        info!(component = %component, "Component authorized");
        self.authorized.write().insert(component);
    }

    /// Remove a component from the authorized set
    pub fn revoke(&self, component: &ComponentId) -> bool {
        let removed = self.authorized.write().remove(component);
        if removed {
            info!(component = %component, "Component authorization revoked");
        }
        removed
    }

    /// Check membership without failing
    pub fn is_authorized(&self, component: &ComponentId) -> bool {
        self.authorized.read().contains(component)
    }

    /// Require that the caller is authorized, or fail with a typed error
    pub fn require(&self, caller: &ComponentId) -> Result<()> {
        if self.is_authorized(caller) {
            Ok(())
        } else {
            warn!(caller = %caller, "Rejected call from unauthorized component");
            Err(EngineError::Unauthorized(caller.clone()))
        }
    }

    /// Number of authorized components
    pub fn len(&self) -> usize {
        self.authorized.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.authorized.read().is_empty()
    }
}

impl Default for ServiceDirectory {
    fn default() -> Self {
        Self::new()
    }
}
