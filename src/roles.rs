//! Capability sets mapped to principals
use std::collections::{BTreeMap, BTreeSet};

use crate::types::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode)]
pub enum Capability {
    #[n(0)]
    Admin,
    #[n(1)]
    Executor,
    #[n(2)]
    Pauser,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Capability::Admin, Capability::Executor, Capability::Pauser];
}

/// Answers "does principal P hold capability C". Pure and in-memory, it never
/// performs business logic on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct RoleRegistry {
    #[n(0)]
    grants: BTreeMap<Capability, BTreeSet<Identity>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, capability: Capability, identity: Identity) {
        self.grants.entry(capability).or_default().insert(identity);
    }

    /// Revoking a capability the identity lacks is a no-op.
    pub fn revoke(&mut self, capability: Capability, identity: &Identity) {
        if let Some(holders) = self.grants.get_mut(&capability) {
            holders.remove(identity);
            if holders.is_empty() {
                self.grants.remove(&capability);
            }
        }
    }

    pub fn has(&self, capability: Capability, identity: &Identity) -> bool {
        self.grants
            .get(&capability)
            .is_some_and(|holders| holders.contains(identity))
    }

    pub fn holds_any(&self, identity: &Identity) -> bool {
        Capability::ALL.iter().any(|c| self.has(*c, identity))
    }

    pub fn holders(&self, capability: Capability) -> Vec<Identity> {
        self.grants
            .get(&capability)
            .map(|holders| holders.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Move a capability from `old` to `new`. Callers stage the registry, so the
    /// pair is observed as one change.
    pub fn rotate(&mut self, capability: Capability, old: &Identity, new: Identity) {
        self.revoke(capability, old);
        self.grant(capability, new);
    }
}
