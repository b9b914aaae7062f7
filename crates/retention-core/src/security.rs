//! Protected model artifacts.
//!
//! Properties and aspects registered here can only be edited by users
//! holding one of the artifact's capabilities on the node. The checks never
//! fail for unregistered names; turning a `false` into an error is left to
//! the write path (see [`ModelSecurityService::check_property`]).

use crate::capability::CapabilityService;
use crate::context::OperationContext;
use crate::error::{Result, RetentionError};
use crate::store::NodeStore;
use crate::types::{AccessStatus, Capability, NodeId, Properties, QName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A protected property or aspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedArtifact {
    pub name: QName,
    /// Holding any one of these is enough to edit.
    pub capabilities: BTreeSet<Capability>,
    /// The artifact may be set freely while its node is being created.
    #[serde(default)]
    pub always_allow_new: bool,
}

impl ProtectedArtifact {
    pub fn new(name: QName, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        ProtectedArtifact {
            name,
            capabilities: capabilities.into_iter().collect(),
            always_allow_new: false,
        }
    }

    pub fn always_allow_new(mut self) -> Self {
        self.always_allow_new = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ModelSecurityService {
    enabled: bool,
    properties: BTreeMap<QName, ProtectedArtifact>,
    aspects: BTreeMap<QName, ProtectedArtifact>,
}

impl Default for ModelSecurityService {
    fn default() -> Self {
        ModelSecurityService {
            enabled: true,
            properties: BTreeMap::new(),
            aspects: BTreeMap::new(),
        }
    }
}

impl ModelSecurityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(
        enabled: bool,
        properties: &[ProtectedArtifact],
        aspects: &[ProtectedArtifact],
    ) -> Result<Self> {
        let mut service = Self::new();
        service.enabled = enabled;
        for p in properties {
            service.register_property(p.clone())?;
        }
        for a in aspects {
            service.register_aspect(a.clone())?;
        }
        Ok(service)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn register_property(&mut self, artifact: ProtectedArtifact) -> Result<()> {
        register(&mut self.properties, artifact)
    }

    pub fn register_aspect(&mut self, artifact: ProtectedArtifact) -> Result<()> {
        register(&mut self.aspects, artifact)
    }

    pub fn is_protected_property(&self, name: &QName) -> bool {
        self.properties.contains_key(name)
    }

    pub fn is_protected_aspect(&self, name: &QName) -> bool {
        self.aspects.contains_key(name)
    }

    pub fn get_protected_property(&self, name: &QName) -> Option<&ProtectedArtifact> {
        self.properties.get(name)
    }

    pub fn get_protected_aspect(&self, name: &QName) -> Option<&ProtectedArtifact> {
        self.aspects.get(name)
    }

    pub fn protected_properties(&self) -> impl Iterator<Item = &ProtectedArtifact> {
        self.properties.values()
    }

    pub fn protected_aspects(&self) -> impl Iterator<Item = &ProtectedArtifact> {
        self.aspects.values()
    }

    /// Whether going from `before` to `after` touches a protected property.
    pub fn includes_protected_property_change(&self, before: &Properties, after: &Properties) -> bool {
        self.properties
            .keys()
            .any(|p| before.get(p) != after.get(p))
    }

    pub fn can_edit_protected_property(
        &self,
        ctx: &OperationContext,
        store: &dyn NodeStore,
        capabilities: &dyn CapabilityService,
        node: &NodeId,
        property: &QName,
    ) -> bool {
        let Some(artifact) = self.properties.get(property) else {
            return true;
        };
        let unset = store.property(node, property).is_none();
        self.can_edit(ctx, store, capabilities, node, artifact, unset)
    }

    pub fn can_edit_protected_aspect(
        &self,
        ctx: &OperationContext,
        store: &dyn NodeStore,
        capabilities: &dyn CapabilityService,
        node: &NodeId,
        aspect: &QName,
    ) -> bool {
        let Some(artifact) = self.aspects.get(aspect) else {
            return true;
        };
        let unset = !store.has_aspect(node, aspect);
        self.can_edit(ctx, store, capabilities, node, artifact, unset)
    }

    pub fn check_property(
        &self,
        ctx: &OperationContext,
        store: &dyn NodeStore,
        capabilities: &dyn CapabilityService,
        node: &NodeId,
        property: &QName,
    ) -> Result<()> {
        if self.can_edit_protected_property(ctx, store, capabilities, node, property) {
            return Ok(());
        }
        Err(RetentionError::ProtectedPropertyDenied {
            property: property.to_string(),
            node: node.to_string(),
        })
    }

    pub fn check_aspect(
        &self,
        ctx: &OperationContext,
        store: &dyn NodeStore,
        capabilities: &dyn CapabilityService,
        node: &NodeId,
        aspect: &QName,
    ) -> Result<()> {
        if self.can_edit_protected_aspect(ctx, store, capabilities, node, aspect) {
            return Ok(());
        }
        Err(RetentionError::ProtectedAspectDenied {
            aspect: aspect.to_string(),
            node: node.to_string(),
        })
    }

    fn can_edit(
        &self,
        ctx: &OperationContext,
        store: &dyn NodeStore,
        capabilities: &dyn CapabilityService,
        node: &NodeId,
        artifact: &ProtectedArtifact,
        unset: bool,
    ) -> bool {
        if !self.enabled || !ctx.is_model_security_enabled() || ctx.is_system() {
            return true;
        }
        if artifact.always_allow_new && unset && store.is_new(node) {
            return true;
        }
        let required: Vec<Capability> = artifact.capabilities.iter().copied().collect();
        let status = capabilities.evaluate_access(ctx.user(), node, &required);
        if status == AccessStatus::Denied {
            debug!(user = ctx.user(), node = %node, artifact = %artifact.name, "protected edit denied");
        }
        !status.is_denied()
    }
}

fn register(
    registry: &mut BTreeMap<QName, ProtectedArtifact>,
    artifact: ProtectedArtifact,
) -> Result<()> {
    if artifact.capabilities.is_empty() {
        return Err(RetentionError::InvalidArtifact(artifact.name.to_string()));
    }
    if registry.contains_key(&artifact.name) {
        return Err(RetentionError::ArtifactExists(artifact.name.to_string()));
    }
    registry.insert(artifact.name.clone(), artifact);
    Ok(())
}
