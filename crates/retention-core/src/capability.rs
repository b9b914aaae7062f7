use crate::types::{AccessStatus, Capability, NodeId};
use std::collections::{BTreeMap, BTreeSet};

/// Resolves whether a user holds capabilities on a node.
pub trait CapabilityService {
    /// `Allowed` when the user holds any of `capabilities` on `node`,
    /// `Denied` when they hold none, `Undetermined` for an empty request.
    fn evaluate_access(&self, user: &str, node: &NodeId, capabilities: &[Capability])
        -> AccessStatus;
}

/// Grants read from configuration: each user holds a fixed capability set
/// across the whole file plan.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilityService {
    grants: BTreeMap<String, BTreeSet<Capability>>,
}

impl StaticCapabilityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_grants<'a, I>(grants: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Vec<Capability>)>,
    {
        let mut service = Self::new();
        for (user, caps) in grants {
            for cap in caps {
                service.grant(user, *cap);
            }
        }
        service
    }

    pub fn grant(&mut self, user: &str, capability: Capability) {
        self.grants
            .entry(user.to_string())
            .or_default()
            .insert(capability);
    }

    pub fn revoke(&mut self, user: &str, capability: Capability) {
        if let Some(caps) = self.grants.get_mut(user) {
            caps.remove(&capability);
        }
    }

    pub fn capabilities_of(&self, user: &str) -> Vec<Capability> {
        self.grants
            .get(user)
            .map(|caps| caps.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl CapabilityService for StaticCapabilityService {
    fn evaluate_access(
        &self,
        user: &str,
        _node: &NodeId,
        capabilities: &[Capability],
    ) -> AccessStatus {
        if capabilities.is_empty() {
            return AccessStatus::Undetermined;
        }
        let held = self.grants.get(user);
        if capabilities
            .iter()
            .any(|c| held.is_some_and(|h| h.contains(c)))
        {
            AccessStatus::Allowed
        } else {
            AccessStatus::Denied
        }
    }
}
