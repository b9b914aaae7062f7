//! Node and property store.
//!
//! [`NodeStore`] is the repository surface the engines are written against:
//! typed nodes carrying properties and aspects, linked by parent/child
//! associations, mutated inside transactions. [`InMemoryStore`] is the
//! bundled implementation; it snapshots on the outermost `begin` and
//! restores the snapshot on rollback.

use crate::error::{Result, RetentionError};
use crate::model::{self, PROP_NAME};
use crate::paths;
use crate::types::{NodeId, NodeKind, Properties, PropertyValue, QName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// Node / ChildAssoc
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    #[serde(default)]
    pub aspects: BTreeSet<QName>,
    #[serde(default)]
    pub properties: Properties,
}

impl Node {
    pub fn name(&self) -> &str {
        self.properties
            .get(&PROP_NAME)
            .and_then(PropertyValue::as_text)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildAssoc {
    pub parent: NodeId,
    pub child: NodeId,
    pub assoc_type: QName,
    pub qname: QName,
    #[serde(default)]
    pub primary: bool,
}

// ---------------------------------------------------------------------------
// NodeStore
// ---------------------------------------------------------------------------

pub trait NodeStore {
    fn exists(&self, node: &NodeId) -> bool;

    fn node(&self, node: &NodeId) -> Option<&Node>;

    /// Create a node named `name`. With a parent, a primary child association
    /// of `assoc_type` links the two.
    fn create_node(
        &mut self,
        parent: Option<&NodeId>,
        assoc_type: &QName,
        kind: NodeKind,
        name: &str,
        properties: Properties,
    ) -> Result<NodeId>;

    /// Delete a node together with its primary descendants and every
    /// association touching them.
    fn delete_node(&mut self, node: &NodeId) -> Result<()>;

    fn property(&self, node: &NodeId, property: &QName) -> Option<&PropertyValue>;

    /// Set or, with `None`, clear a property. Setting a property bound to an
    /// aspect adds the aspect.
    fn set_property(
        &mut self,
        node: &NodeId,
        property: &QName,
        value: Option<PropertyValue>,
    ) -> Result<()>;

    fn add_properties(&mut self, node: &NodeId, properties: Properties) -> Result<()>;

    fn has_aspect(&self, node: &NodeId, aspect: &QName) -> bool;

    fn add_aspect(&mut self, node: &NodeId, aspect: &QName, properties: Properties)
        -> Result<()>;

    /// Remove an aspect and every property bound to it.
    fn remove_aspect(&mut self, node: &NodeId, aspect: &QName) -> Result<()>;

    fn primary_parent(&self, node: &NodeId) -> Option<ChildAssoc>;

    fn child_assocs(&self, node: &NodeId, assoc_type: Option<&QName>) -> Vec<ChildAssoc>;

    fn parent_assocs(&self, node: &NodeId, assoc_type: Option<&QName>) -> Vec<ChildAssoc>;

    /// Add a secondary child association. Adding an existing association is
    /// a no-op.
    fn add_child(
        &mut self,
        parent: &NodeId,
        child: &NodeId,
        assoc_type: &QName,
        qname: QName,
    ) -> Result<ChildAssoc>;

    /// Remove a secondary child association. Returns whether one existed.
    fn remove_child(&mut self, parent: &NodeId, child: &NodeId, assoc_type: &QName)
        -> Result<bool>;

    /// Re-parent a node's primary association, giving it `assoc_type`.
    fn move_node(&mut self, node: &NodeId, new_parent: &NodeId, assoc_type: &QName)
        -> Result<()>;

    fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId>;

    /// True only for nodes created in the current, uncommitted transaction.
    fn is_new(&self, node: &NodeId) -> bool;

    fn begin(&mut self);

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self);

    // -- provided -----------------------------------------------------------

    fn kind(&self, node: &NodeId) -> Option<NodeKind> {
        self.node(node).map(|n| n.kind)
    }

    fn name(&self, node: &NodeId) -> Option<String> {
        self.node(node).map(|n| n.name().to_string())
    }

    fn properties(&self, node: &NodeId) -> Properties {
        self.node(node)
            .map(|n| n.properties.clone())
            .unwrap_or_default()
    }

    fn text_property(&self, node: &NodeId, property: &QName) -> Option<String> {
        self.property(node, property)
            .and_then(PropertyValue::as_text)
            .map(str::to_string)
    }

    fn date_property(&self, node: &NodeId, property: &QName) -> Option<DateTime<Utc>> {
        self.property(node, property).and_then(PropertyValue::as_date)
    }

    fn bool_property(&self, node: &NodeId, property: &QName) -> Option<bool> {
        self.property(node, property).and_then(PropertyValue::as_bool)
    }

    fn int_property(&self, node: &NodeId, property: &QName) -> Option<i64> {
        self.property(node, property).and_then(PropertyValue::as_int)
    }

    fn require(&self, node: &NodeId) -> Result<&Node> {
        self.node(node)
            .ok_or_else(|| RetentionError::NodeNotFound(node.to_string()))
    }

    fn require_kind(&self, node: &NodeId, expected: &[NodeKind]) -> Result<NodeKind> {
        let actual = self.require(node)?.kind;
        if expected.contains(&actual) {
            return Ok(actual);
        }
        let expected = match expected.first() {
            Some(kind) => kind.as_str(),
            None => "node",
        };
        Err(RetentionError::UnexpectedNodeKind {
            node: node.to_string(),
            expected,
            actual,
        })
    }

    /// Child node ids, optionally restricted to one association type.
    fn children(&self, node: &NodeId, assoc_type: Option<&QName>) -> Vec<NodeId> {
        self.child_assocs(node, assoc_type)
            .into_iter()
            .map(|a| a.child)
            .collect()
    }

    /// The primary child of `parent` with the given name.
    fn child_by_name(&self, parent: &NodeId, name: &str) -> Option<NodeId> {
        self.child_assocs(parent, None)
            .into_iter()
            .filter(|a| a.primary)
            .map(|a| a.child)
            .find(|c| self.node(c).is_some_and(|n| n.name() == name))
    }
}

/// Run `f` inside a transaction. Nested calls join the outer transaction;
/// an inner failure dooms the whole transaction.
pub fn in_transaction<S, T, F>(store: &mut S, f: F) -> Result<T>
where
    S: NodeStore + ?Sized,
    F: FnOnce(&mut S) -> Result<T>,
{
    store.begin();
    match f(&mut *store) {
        Ok(value) => {
            store.commit()?;
            Ok(value)
        }
        Err(e) => {
            store.rollback();
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryStore {
    #[serde(default)]
    nodes: BTreeMap<NodeId, Node>,
    #[serde(default)]
    assocs: Vec<ChildAssoc>,
    #[serde(skip)]
    txn: Transaction,
}

#[derive(Debug, Clone, Default)]
struct Transaction {
    depth: u32,
    snapshot: Option<Snapshot>,
    created: BTreeSet<NodeId>,
    rollback_only: bool,
}

#[derive(Debug, Clone)]
struct Snapshot {
    nodes: BTreeMap<NodeId, Node>,
    assocs: Vec<ChildAssoc>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::store_path(root);
        if !path.exists() {
            return Err(RetentionError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let store: InMemoryStore = serde_yaml::from_str(&data)?;
        Ok(store)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::store_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.depth > 0
    }

    fn node_mut(&mut self, node: &NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(node)
            .ok_or_else(|| RetentionError::NodeNotFound(node.to_string()))
    }

    fn descendants(&self, node: &NodeId) -> Vec<NodeId> {
        let mut out = vec![node.clone()];
        let mut i = 0;
        while i < out.len() {
            let current = out[i].clone();
            out.extend(
                self.assocs
                    .iter()
                    .filter(|a| a.primary && a.parent == current)
                    .map(|a| a.child.clone()),
            );
            i += 1;
        }
        out
    }
}

fn bind_aspects(node: &mut Node, properties: &Properties) {
    for key in properties.keys() {
        if let Some(aspect) = model::aspect_for_property(key) {
            node.aspects.insert(aspect);
        }
    }
}

impl NodeStore for InMemoryStore {
    fn exists(&self, node: &NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    fn node(&self, node: &NodeId) -> Option<&Node> {
        self.nodes.get(node)
    }

    fn create_node(
        &mut self,
        parent: Option<&NodeId>,
        assoc_type: &QName,
        kind: NodeKind,
        name: &str,
        mut properties: Properties,
    ) -> Result<NodeId> {
        if let Some(parent) = parent {
            if !self.exists(parent) {
                return Err(RetentionError::NodeNotFound(parent.to_string()));
            }
        }
        let qname = QName::valid_from("cm", name)?;
        let id = NodeId::generate();
        properties.insert(PROP_NAME, PropertyValue::Text(name.to_string()));
        let mut node = Node {
            id: id.clone(),
            kind,
            aspects: BTreeSet::new(),
            properties,
        };
        let bound = node.properties.clone();
        bind_aspects(&mut node, &bound);
        self.nodes.insert(id.clone(), node);

        if let Some(parent) = parent {
            self.assocs.push(ChildAssoc {
                parent: parent.clone(),
                child: id.clone(),
                assoc_type: assoc_type.clone(),
                qname,
                primary: true,
            });
        }
        if self.txn.depth > 0 {
            self.txn.created.insert(id.clone());
        }
        Ok(id)
    }

    fn delete_node(&mut self, node: &NodeId) -> Result<()> {
        if !self.exists(node) {
            return Err(RetentionError::NodeNotFound(node.to_string()));
        }
        let doomed: BTreeSet<NodeId> = self.descendants(node).into_iter().collect();
        self.nodes.retain(|id, _| !doomed.contains(id));
        self.assocs
            .retain(|a| !doomed.contains(&a.parent) && !doomed.contains(&a.child));
        Ok(())
    }

    fn property(&self, node: &NodeId, property: &QName) -> Option<&PropertyValue> {
        self.nodes.get(node)?.properties.get(property)
    }

    fn set_property(
        &mut self,
        node: &NodeId,
        property: &QName,
        value: Option<PropertyValue>,
    ) -> Result<()> {
        let n = self.node_mut(node)?;
        match value {
            Some(value) => {
                n.properties.insert(property.clone(), value);
                if let Some(aspect) = model::aspect_for_property(property) {
                    n.aspects.insert(aspect);
                }
            }
            None => {
                n.properties.remove(property);
            }
        }
        Ok(())
    }

    fn add_properties(&mut self, node: &NodeId, properties: Properties) -> Result<()> {
        let n = self.node_mut(node)?;
        bind_aspects(n, &properties);
        n.properties.extend(properties);
        Ok(())
    }

    fn has_aspect(&self, node: &NodeId, aspect: &QName) -> bool {
        self.nodes
            .get(node)
            .is_some_and(|n| n.aspects.contains(aspect))
    }

    fn add_aspect(
        &mut self,
        node: &NodeId,
        aspect: &QName,
        properties: Properties,
    ) -> Result<()> {
        let n = self.node_mut(node)?;
        n.aspects.insert(aspect.clone());
        bind_aspects(n, &properties);
        n.properties.extend(properties);
        Ok(())
    }

    fn remove_aspect(&mut self, node: &NodeId, aspect: &QName) -> Result<()> {
        let n = self.node_mut(node)?;
        n.aspects.remove(aspect);
        for prop in model::properties_of_aspect(aspect) {
            n.properties.remove(prop);
        }
        Ok(())
    }

    fn primary_parent(&self, node: &NodeId) -> Option<ChildAssoc> {
        self.assocs
            .iter()
            .find(|a| a.primary && &a.child == node)
            .cloned()
    }

    fn child_assocs(&self, node: &NodeId, assoc_type: Option<&QName>) -> Vec<ChildAssoc> {
        self.assocs
            .iter()
            .filter(|a| &a.parent == node && assoc_type.map_or(true, |t| &a.assoc_type == t))
            .cloned()
            .collect()
    }

    fn parent_assocs(&self, node: &NodeId, assoc_type: Option<&QName>) -> Vec<ChildAssoc> {
        self.assocs
            .iter()
            .filter(|a| &a.child == node && assoc_type.map_or(true, |t| &a.assoc_type == t))
            .cloned()
            .collect()
    }

    fn add_child(
        &mut self,
        parent: &NodeId,
        child: &NodeId,
        assoc_type: &QName,
        qname: QName,
    ) -> Result<ChildAssoc> {
        for id in [parent, child] {
            if !self.exists(id) {
                return Err(RetentionError::NodeNotFound(id.to_string()));
            }
        }
        if let Some(existing) = self
            .assocs
            .iter()
            .find(|a| &a.parent == parent && &a.child == child && &a.assoc_type == assoc_type)
        {
            return Ok(existing.clone());
        }
        let assoc = ChildAssoc {
            parent: parent.clone(),
            child: child.clone(),
            assoc_type: assoc_type.clone(),
            qname,
            primary: false,
        };
        self.assocs.push(assoc.clone());
        Ok(assoc)
    }

    fn remove_child(
        &mut self,
        parent: &NodeId,
        child: &NodeId,
        assoc_type: &QName,
    ) -> Result<bool> {
        let before = self.assocs.len();
        self.assocs.retain(|a| {
            a.primary || !(&a.parent == parent && &a.child == child && &a.assoc_type == assoc_type)
        });
        Ok(self.assocs.len() != before)
    }

    fn move_node(
        &mut self,
        node: &NodeId,
        new_parent: &NodeId,
        assoc_type: &QName,
    ) -> Result<()> {
        if !self.exists(new_parent) {
            return Err(RetentionError::NodeNotFound(new_parent.to_string()));
        }
        if self.descendants(node).contains(new_parent) {
            return Err(RetentionError::UnexpectedNodeKind {
                node: new_parent.to_string(),
                expected: "node outside the moved subtree",
                actual: self.require(new_parent)?.kind,
            });
        }
        let assoc = self
            .assocs
            .iter_mut()
            .find(|a| a.primary && &a.child == node)
            .ok_or_else(|| RetentionError::NodeNotFound(node.to_string()))?;
        assoc.parent = new_parent.clone();
        assoc.assoc_type = assoc_type.clone();
        Ok(())
    }

    fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.kind == kind)
            .map(|n| n.id.clone())
            .collect()
    }

    fn is_new(&self, node: &NodeId) -> bool {
        self.txn.depth > 0 && self.txn.created.contains(node)
    }

    fn begin(&mut self) {
        if self.txn.depth == 0 {
            self.txn.snapshot = Some(Snapshot {
                nodes: self.nodes.clone(),
                assocs: self.assocs.clone(),
            });
            self.txn.created.clear();
            self.txn.rollback_only = false;
        }
        self.txn.depth += 1;
    }

    fn commit(&mut self) -> Result<()> {
        if self.txn.depth == 0 {
            return Err(RetentionError::NoTransaction);
        }
        self.txn.depth -= 1;
        if self.txn.depth > 0 {
            return Ok(());
        }
        if self.txn.rollback_only {
            self.restore();
            return Err(RetentionError::TransactionRolledBack);
        }
        self.txn = Transaction::default();
        Ok(())
    }

    fn rollback(&mut self) {
        if self.txn.depth == 0 {
            return;
        }
        self.txn.depth -= 1;
        if self.txn.depth > 0 {
            self.txn.rollback_only = true;
        } else {
            self.restore();
        }
    }
}

impl InMemoryStore {
    fn restore(&mut self) {
        if let Some(snapshot) = self.txn.snapshot.take() {
            self.nodes = snapshot.nodes;
            self.assocs = snapshot.assocs;
        }
        self.txn = Transaction::default();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
