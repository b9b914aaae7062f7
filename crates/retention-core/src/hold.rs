//! Holds.
//!
//! A hold is a container node under the file plan's hold container. Items
//! join a hold through a secondary `rma:frozenContent` association named
//! after the item. Membership of any hold freezes the item; a record in a
//! held folder is frozen too.

use crate::context::OperationContext;
use crate::error::{Result, RetentionError};
use crate::model::{
    ASPECT_FROZEN, ASSOC_CONTAINS, ASSOC_FROZEN_CONTENT, HOLD_CONTAINER_NAME, PROP_DESCRIPTION,
    PROP_FROZEN_AT, PROP_FROZEN_BY, PROP_HOLD_REASON,
};
use crate::store::NodeStore;
use crate::types::{NodeId, NodeKind, Properties, QName};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

pub fn get_hold_container(store: &dyn NodeStore, file_plan: &NodeId) -> Option<NodeId> {
    store
        .children(file_plan, Some(&ASSOC_CONTAINS))
        .into_iter()
        .find(|c| store.kind(c) == Some(NodeKind::HoldContainer))
}

pub fn get_holds_in_file_plan(store: &dyn NodeStore, file_plan: &NodeId) -> Vec<NodeId> {
    let Some(container) = get_hold_container(store, file_plan) else {
        return Vec::new();
    };
    store
        .children(&container, Some(&ASSOC_CONTAINS))
        .into_iter()
        .filter(|c| store.kind(c) == Some(NodeKind::Hold))
        .collect()
}

pub fn get_hold(store: &dyn NodeStore, file_plan: &NodeId, name: &str) -> Option<NodeId> {
    get_holds_in_file_plan(store, file_plan)
        .into_iter()
        .find(|h| store.name(h).as_deref() == Some(name))
}

pub fn is_hold(store: &dyn NodeStore, node: &NodeId) -> bool {
    store.kind(node) == Some(NodeKind::Hold)
}

/// Items directly held by `hold`.
pub fn get_held(store: &dyn NodeStore, hold: &NodeId) -> Result<Vec<NodeId>> {
    require_hold(store, hold)?;
    Ok(store.children(hold, Some(&ASSOC_FROZEN_CONTENT)))
}

/// Holds `node` belongs to directly.
pub fn get_direct_holds(store: &dyn NodeStore, node: &NodeId) -> Vec<NodeId> {
    store
        .parent_assocs(node, Some(&ASSOC_FROZEN_CONTENT))
        .into_iter()
        .map(|a| a.parent)
        .collect()
}

/// Holds freezing `node`: its own, plus those of its folder for a record.
pub fn get_holds_for_item(store: &dyn NodeStore, node: &NodeId) -> Vec<NodeId> {
    let mut holds = get_direct_holds(store, node);
    if store.kind(node) == Some(NodeKind::Record) {
        let folders = store
            .parent_assocs(node, Some(&ASSOC_CONTAINS))
            .into_iter()
            .map(|a| a.parent)
            .filter(|p| store.kind(p) == Some(NodeKind::RecordFolder));
        for folder in folders {
            for hold in get_direct_holds(store, &folder) {
                if !holds.contains(&hold) {
                    holds.push(hold);
                }
            }
        }
    }
    holds
}

/// Holds of the file plan that freeze `node` when `included`, or the ones
/// that do not when it is not.
pub fn held_by(store: &dyn NodeStore, file_plan: &NodeId, node: &NodeId, included: bool) -> Vec<NodeId> {
    let freezing = get_holds_for_item(store, node);
    get_holds_in_file_plan(store, file_plan)
        .into_iter()
        .filter(|h| freezing.contains(h) == included)
        .collect()
}

pub fn get_hold_reason(store: &dyn NodeStore, hold: &NodeId) -> Result<Option<String>> {
    require_hold(store, hold)?;
    Ok(store.text_property(hold, &PROP_HOLD_REASON))
}

/// The single predicate disposition execution consults.
pub fn is_frozen(store: &dyn NodeStore, node: &NodeId) -> bool {
    !get_holds_for_item(store, node).is_empty()
}

// ---------------------------------------------------------------------------
// Lifecycle of holds
// ---------------------------------------------------------------------------

/// Create the hold container for a file plan if it is missing.
pub fn ensure_hold_container(store: &mut dyn NodeStore, file_plan: &NodeId) -> Result<NodeId> {
    store.require_kind(file_plan, &[NodeKind::FilePlan])?;
    if let Some(container) = get_hold_container(store, file_plan) {
        return Ok(container);
    }
    store.create_node(
        Some(file_plan),
        &ASSOC_CONTAINS,
        NodeKind::HoldContainer,
        HOLD_CONTAINER_NAME,
        Properties::new(),
    )
}

pub fn create_hold(
    store: &mut dyn NodeStore,
    file_plan: &NodeId,
    name: &str,
    reason: &str,
    description: Option<&str>,
) -> Result<NodeId> {
    if name.trim().is_empty() {
        return Err(RetentionError::InvalidHold("name must not be blank".into()));
    }
    if reason.trim().is_empty() {
        return Err(RetentionError::InvalidHold(format!("hold '{name}' needs a reason")));
    }
    let container = ensure_hold_container(store, file_plan)?;
    if get_hold(store, file_plan, name).is_some() {
        return Err(RetentionError::HoldExists(name.to_string()));
    }
    let mut props = Properties::new();
    props.insert(PROP_HOLD_REASON, reason.into());
    if let Some(description) = description {
        props.insert(PROP_DESCRIPTION, description.into());
    }
    let hold = store.create_node(
        Some(&container),
        &ASSOC_CONTAINS,
        NodeKind::Hold,
        name,
        props,
    )?;
    info!(hold = %hold, name, "hold created");
    Ok(hold)
}

/// Replace the reason of `hold`. A hold always keeps a non-blank reason.
pub fn set_hold_reason(store: &mut dyn NodeStore, hold: &NodeId, reason: &str) -> Result<()> {
    require_hold(store, hold)?;
    if reason.trim().is_empty() {
        return Err(RetentionError::InvalidHold(format!("hold '{hold}' needs a reason")));
    }
    store.set_property(hold, &PROP_HOLD_REASON, Some(reason.into()))?;
    info!(hold = %hold, "hold reason changed");
    Ok(())
}

/// Release every member of `hold`, then delete it.
pub fn delete_hold(ctx: &OperationContext, store: &mut dyn NodeStore, hold: &NodeId) -> Result<()> {
    for item in get_held(store, hold)? {
        remove_from_hold(ctx, store, hold, &item)?;
    }
    store.delete_node(hold)?;
    info!(hold = %hold, "hold deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

/// Add `node` to `hold`. Adding an existing member is a no-op.
pub fn add_to_hold(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    hold: &NodeId,
    node: &NodeId,
) -> Result<()> {
    require_hold(store, hold)?;
    require_holdable(store, node)?;
    if get_direct_holds(store, node).contains(hold) {
        debug!(hold = %hold, node = %node, "already held");
        return Ok(());
    }
    let name = store.name(node).unwrap_or_default();
    store.add_child(hold, node, &ASSOC_FROZEN_CONTENT, QName::valid_from("cm", &name)?)?;
    refresh_frozen(ctx, store, node)?;
    info!(hold = %hold, node = %node, "added to hold");
    Ok(())
}

pub fn add_to_holds(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    holds: &[NodeId],
    node: &NodeId,
) -> Result<()> {
    for hold in holds {
        add_to_hold(ctx, store, hold, node)?;
    }
    Ok(())
}

/// Remove `node` from `hold`. Removing a non-member is a no-op.
pub fn remove_from_hold(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    hold: &NodeId,
    node: &NodeId,
) -> Result<()> {
    require_hold(store, hold)?;
    if !store.remove_child(hold, node, &ASSOC_FROZEN_CONTENT)? {
        debug!(hold = %hold, node = %node, "not a member, nothing to remove");
        return Ok(());
    }
    refresh_frozen(ctx, store, node)?;
    info!(hold = %hold, node = %node, "removed from hold");
    Ok(())
}

pub fn remove_from_holds(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    holds: &[NodeId],
    node: &NodeId,
) -> Result<()> {
    for hold in holds {
        remove_from_hold(ctx, store, hold, node)?;
    }
    Ok(())
}

pub fn remove_from_all_holds(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    node: &NodeId,
) -> Result<()> {
    let holds = get_direct_holds(store, node);
    remove_from_holds(ctx, store, &holds, node)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require_hold(store: &dyn NodeStore, hold: &NodeId) -> Result<()> {
    store.require(hold)?;
    if !is_hold(store, hold) {
        return Err(RetentionError::NotAHold(hold.to_string()));
    }
    Ok(())
}

fn require_holdable(store: &dyn NodeStore, node: &NodeId) -> Result<()> {
    match store.require(node)?.kind {
        NodeKind::Record | NodeKind::RecordFolder => Ok(()),
        _ => Err(RetentionError::InvalidHoldItem(node.to_string())),
    }
}

/// Bring the `rma:frozen` marker on `node` (and a folder's records) in line
/// with its hold membership.
pub(crate) fn refresh_frozen(ctx: &OperationContext, store: &mut dyn NodeStore, node: &NodeId) -> Result<()> {
    let mut targets = vec![node.clone()];
    if store.kind(node) == Some(NodeKind::RecordFolder) {
        targets.extend(
            store
                .children(node, Some(&ASSOC_CONTAINS))
                .into_iter()
                .filter(|c| store.kind(c) == Some(NodeKind::Record)),
        );
    }
    for target in targets {
        let frozen = is_frozen(store, &target);
        let marked = store.has_aspect(&target, &ASPECT_FROZEN);
        if frozen && !marked {
            let mut props = Properties::new();
            props.insert(PROP_FROZEN_AT, ctx.now().into());
            props.insert(PROP_FROZEN_BY, ctx.user().into());
            store.add_aspect(&target, &ASPECT_FROZEN, props)?;
        } else if !frozen && marked {
            store.remove_aspect(&target, &ASPECT_FROZEN)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
