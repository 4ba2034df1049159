//! In-memory permission gate
//!
//! Grants can be flipped at runtime, which is how revocation between calls
//! is exercised without a real OS.

use crate::domain::models::Capability;
use crate::domain::platform::PermissionGate;
use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

#[derive(Debug, Default)]
pub struct StaticPermissions {
    granted: RwLock<HashSet<Capability>>,
}

impl StaticPermissions {
    pub fn all_granted() -> Self {
        Self::with_granted(&[Capability::Scan, Capability::Connect])
    }

    pub fn none_granted() -> Self {
        Self::default()
    }

    pub fn with_granted(capabilities: &[Capability]) -> Self {
        Self {
            granted: RwLock::new(capabilities.iter().copied().collect()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashSet<Capability>> {
        self.granted.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashSet<Capability>> {
        self.granted.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn grant(&self, capability: Capability) {
        info!("Granting {}", capability);
        self.write().insert(capability);
    }

    pub fn revoke(&self, capability: Capability) {
        info!("Revoking {}", capability);
        self.write().remove(&capability);
    }
}

impl PermissionGate for StaticPermissions {
    fn has_permission(&self, capability: Capability) -> bool {
        self.read().contains(&capability)
    }
}
