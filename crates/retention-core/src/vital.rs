//! Vital records.
//!
//! Categories and folders carry a vital record definition (indicator plus
//! review period). Records take the definition of their primary parent.
//! A node whose resolved definition is enabled carries `rma:vitalRecord`
//! with the next review date.

use crate::behaviour::{ChangeNotifier, PropertyUpdate, PropertyUpdateListener};
use crate::context::OperationContext;
use crate::error::{Result, RetentionError};
use crate::model::{
    ASPECT_VITAL_RECORD, ASPECT_VITAL_RECORD_DEFINITION, ASSOC_CONTAINS, PROP_REVIEW_AS_OF,
    PROP_REVIEW_PERIOD, PROP_VITAL_RECORD_INDICATOR,
};
use crate::period::Period;
use crate::store::NodeStore;
use crate::types::{NodeId, NodeKind, Properties, PropertyValue};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VitalRecordDefinition {
    pub enabled: bool,
    pub review_period: Period,
}

impl VitalRecordDefinition {
    pub fn new(enabled: bool, review_period: Period) -> Self {
        VitalRecordDefinition {
            enabled,
            review_period,
        }
    }

    /// Next review date counted from `now`, when enabled.
    pub fn next_review_date(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.enabled {
            return None;
        }
        self.review_period.next_date(now)
    }

    /// The definition a node carries itself, if any.
    fn read_own(store: &dyn NodeStore, node: &NodeId) -> Result<Option<Self>> {
        if !store.has_aspect(node, &ASPECT_VITAL_RECORD_DEFINITION) {
            return Ok(None);
        }
        let enabled = store
            .bool_property(node, &PROP_VITAL_RECORD_INDICATOR)
            .unwrap_or(false);
        let review_period = match store.text_property(node, &PROP_REVIEW_PERIOD) {
            Some(p) => p.parse()?,
            None => Period::NONE,
        };
        Ok(Some(VitalRecordDefinition::new(enabled, review_period)))
    }
}

/// Resolve the definition that applies to `node`. A record uses its primary
/// parent's definition; folders and categories use their own. Only the
/// primary parent is consulted, so the folders a record is additionally
/// filed in never contribute.
pub fn get_vital_record_definition(
    store: &dyn NodeStore,
    node: &NodeId,
) -> Result<Option<VitalRecordDefinition>> {
    match store.require(node)?.kind {
        NodeKind::Record => match store.primary_parent(node) {
            Some(parent) => VitalRecordDefinition::read_own(store, &parent.parent),
            None => Ok(None),
        },
        NodeKind::RecordFolder | NodeKind::RecordCategory => {
            VitalRecordDefinition::read_own(store, node)
        }
        _ => Ok(None),
    }
}

pub fn is_vital_record(store: &dyn NodeStore, node: &NodeId) -> bool {
    store.has_aspect(node, &ASPECT_VITAL_RECORD)
}

/// Copy the parent category's definition onto a new category or folder
/// whose own review period is unset. Record edges never propagate.
pub fn setup_vital_record_definition(store: &mut dyn NodeStore, node: &NodeId) -> Result<()> {
    match store.kind(node) {
        Some(NodeKind::RecordCategory | NodeKind::RecordFolder) => {}
        _ => return Ok(()),
    }
    if store.property(node, &PROP_REVIEW_PERIOD).is_some() {
        return Ok(());
    }
    let Some(parent) = store.primary_parent(node).map(|a| a.parent) else {
        return Ok(());
    };
    if store.kind(&parent) != Some(NodeKind::RecordCategory) {
        return Ok(());
    }
    let mut inherited = Properties::new();
    for property in [PROP_VITAL_RECORD_INDICATOR, PROP_REVIEW_PERIOD] {
        if let Some(value) = store.property(&parent, &property) {
            inherited.insert(property, value.clone());
        }
    }
    if inherited.is_empty() {
        return Ok(());
    }
    debug!(node = %node, parent = %parent, "inheriting vital record definition");
    store.add_properties(node, inherited)
}

/// Add, refresh or drop `rma:vitalRecord` on `node` according to its
/// resolved definition. Unrelated properties are left alone.
pub fn initialise_vital_record(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    node: &NodeId,
) -> Result<Option<DateTime<Utc>>> {
    let review_as_of = get_vital_record_definition(store, node)?
        .and_then(|d| d.next_review_date(ctx.now()));
    let vital = store.has_aspect(node, &ASPECT_VITAL_RECORD);
    match review_as_of {
        Some(date) if vital => {
            store.set_property(node, &PROP_REVIEW_AS_OF, Some(date.into()))?;
        }
        Some(date) => {
            let mut props = Properties::new();
            props.insert(PROP_REVIEW_AS_OF, date.into());
            store.add_aspect(node, &ASPECT_VITAL_RECORD, props)?;
            debug!(node = %node, review_as_of = %date, "node is now a vital record");
        }
        None if vital => {
            store.remove_aspect(node, &ASPECT_VITAL_RECORD)?;
            debug!(node = %node, "node is no longer a vital record");
        }
        None => {}
    }
    Ok(review_as_of)
}

/// Set a category's or folder's own definition.
pub fn set_vital_record_definition(
    store: &mut dyn NodeStore,
    node: &NodeId,
    enabled: bool,
    review_period: Period,
) -> Result<VitalRecordDefinition> {
    store.require_kind(node, &[NodeKind::RecordCategory, NodeKind::RecordFolder])?;
    store.set_property(node, &PROP_VITAL_RECORD_INDICATOR, Some(enabled.into()))?;
    store.set_property(
        node,
        &PROP_REVIEW_PERIOD,
        Some(PropertyValue::Text(review_period.to_string())),
    )?;
    Ok(VitalRecordDefinition::new(enabled, review_period))
}

/// Start a new review cycle from now. The node must be a vital record.
pub fn review_vital_record(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    node: &NodeId,
) -> Result<DateTime<Utc>> {
    if !is_vital_record(store, node) {
        return Err(RetentionError::UnexpectedNodeKind {
            node: node.to_string(),
            expected: "vital record",
            actual: store.require(node)?.kind,
        });
    }
    initialise_vital_record(ctx, store, node)?
        .ok_or_else(|| RetentionError::InvalidPeriod(format!("no review date for {node}")))
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Re-initialises vital record tracking when a folder's or category's
/// definition changes: on the folder itself and on the records filed
/// directly in the changed node.
pub struct VitalRecordDefinitionListener;

impl VitalRecordDefinitionListener {
    pub const NAME: &'static str = "vital-record-definition";
}

impl PropertyUpdateListener for VitalRecordDefinitionListener {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn on_update_properties(
        &self,
        ctx: &mut OperationContext,
        store: &mut dyn NodeStore,
        _notifier: &ChangeNotifier,
        update: &PropertyUpdate,
    ) -> Result<()> {
        if !update.is_changed(&PROP_VITAL_RECORD_INDICATOR) && !update.is_changed(&PROP_REVIEW_PERIOD)
        {
            return Ok(());
        }
        let node = &update.node;
        let kind = store.kind(node);
        if !matches!(kind, Some(NodeKind::RecordFolder | NodeKind::RecordCategory)) {
            return Ok(());
        }
        if kind == Some(NodeKind::RecordFolder) {
            initialise_vital_record(ctx, store, node)?;
        }
        let records: Vec<NodeId> = store
            .child_assocs(node, Some(&ASSOC_CONTAINS))
            .into_iter()
            .filter(|a| a.primary)
            .map(|a| a.child)
            .filter(|c| store.kind(c) == Some(NodeKind::Record))
            .collect();
        for record in records {
            initialise_vital_record(ctx, store, &record)?;
        }
        Ok(())
    }
}
