//! Disposition engine.
//!
//! A record category may carry one disposition schedule: an ordered list of
//! action definitions (cutoff, transfer, destroy, ...). Every disposable
//! item beneath the category (folders, or records for record-level
//! schedules) carries at most one pending [`DispositionAction`]; completed
//! actions move to the item's history and the next definition's action is
//! created in their place.

pub mod action;
pub mod listener;
pub mod schedule;

pub use action::{DispositionAction, EventCompletion};
pub use listener::DispositionPropertyListener;
pub use schedule::{
    ActionDefinitionSpec, DispositionActionDefinition, DispositionSchedule, DispositionStep,
    ScheduleSpec,
};

use crate::context::OperationContext;
use crate::error::{Result, RetentionError};
use crate::event::EventRegistry;
use crate::hold;
use crate::model::{
    ASPECT_ACCESSIONED, ASPECT_CUT_OFF, ASPECT_DESTROYED, ASPECT_DISPOSITION_LIFECYCLE,
    ASPECT_SCHEDULED, ASPECT_TRANSFERRED, ASSOC_CONTAINS, ASSOC_DISPOSITION_ACTION_DEFINITIONS,
    ASSOC_DISPOSITION_ACTION_HISTORY, ASSOC_DISPOSITION_SCHEDULE, ASSOC_EVENT_EXECUTIONS,
    ASSOC_NEXT_DISPOSITION_ACTION, PROP_ACCESSIONED_AT, PROP_CREATED, PROP_CUT_OFF_DATE,
    PROP_DESTROYED_AT, PROP_DISPOSITION_ACTION, PROP_DISPOSITION_ACTION_COMPLETED_AT,
    PROP_DISPOSITION_ACTION_COMPLETED_BY, PROP_DISPOSITION_ACTION_ID,
    PROP_DISPOSITION_ACTION_STARTED_AT, PROP_DISPOSITION_ACTION_STARTED_BY,
    PROP_DISPOSITION_AS_OF, PROP_DISPOSITION_DESCRIPTION, PROP_DISPOSITION_INDEX,
    PROP_DISPOSITION_PERIOD, PROP_DISPOSITION_PERIOD_PROPERTY, PROP_EVENT_EXECUTION_AUTOMATIC,
    PROP_EVENT_EXECUTION_COMPLETE, PROP_EVENT_EXECUTION_COMPLETED_AT,
    PROP_EVENT_EXECUTION_COMPLETED_BY, PROP_EVENT_EXECUTION_NAME, PROP_TRANSFERRED_AT,
};
use crate::period::PeriodType;
use crate::store::NodeStore;
use crate::types::{NodeId, NodeKind, Properties, PropertyValue, QName};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Result of an attempt to execute the pending action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Executed {
        completed: DispositionAction,
        next: Option<DispositionAction>,
    },
    /// The item is held; nothing happened and the call may be retried later.
    Frozen { action: DispositionAction },
    NotEligible { action: DispositionAction },
    NothingPending,
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

fn own_schedule(store: &dyn NodeStore, category: &NodeId) -> Option<NodeId> {
    store
        .children(category, Some(&ASSOC_DISPOSITION_SCHEDULE))
        .into_iter()
        .next()
}

/// The schedule governing `node`: the nearest one walking primary parents.
pub fn get_disposition_schedule(
    store: &dyn NodeStore,
    node: &NodeId,
) -> Option<DispositionSchedule> {
    let mut current = Some(node.clone());
    while let Some(id) = current {
        match store.kind(&id)? {
            NodeKind::RecordCategory => {
                if let Some(schedule) = own_schedule(store, &id) {
                    return DispositionSchedule::read(store, &schedule).ok();
                }
            }
            NodeKind::RecordFolder | NodeKind::Record => {}
            _ => return None,
        }
        current = store.primary_parent(&id).map(|a| a.parent);
    }
    None
}

pub fn create_disposition_schedule(
    store: &mut dyn NodeStore,
    category: &NodeId,
    spec: ScheduleSpec,
) -> Result<DispositionSchedule> {
    store.require_kind(category, &[NodeKind::RecordCategory])?;
    if own_schedule(store, category).is_some() {
        return Err(RetentionError::ScheduleExists(category.to_string()));
    }
    if let Some(inherited) = get_disposition_schedule(store, category) {
        let governed = items_under(store, category, inherited.disposable_kind());
        if governed
            .iter()
            .any(|item| store.has_aspect(item, &ASPECT_DISPOSITION_LIFECYCLE))
        {
            return Err(RetentionError::DisposableItemsPresent(inherited.id.to_string()));
        }
    }
    let name = format!("{} schedule", store.name(category).unwrap_or_default());
    let schedule = store.create_node(
        Some(category),
        &ASSOC_DISPOSITION_SCHEDULE,
        NodeKind::DispositionSchedule,
        &name,
        spec.into_properties(),
    )?;
    store.add_aspect(category, &ASPECT_SCHEDULED, Properties::new())?;
    info!(category = %category, schedule = %schedule, "disposition schedule created");
    DispositionSchedule::read(store, &schedule)
}

fn require_own_schedule(store: &dyn NodeStore, category: &NodeId) -> Result<DispositionSchedule> {
    store.require_kind(category, &[NodeKind::RecordCategory])?;
    let id = own_schedule(store, category)
        .ok_or_else(|| RetentionError::ScheduleNotFound(category.to_string()))?;
    DispositionSchedule::read(store, &id)
}

/// Append a step to the schedule of `category`. Disposable items that had
/// no lifecycle yet are initialised against the new step.
pub fn add_disposition_action_definition(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    events: &EventRegistry,
    category: &NodeId,
    spec: ActionDefinitionSpec,
) -> Result<DispositionActionDefinition> {
    let schedule = require_own_schedule(store, category)?;
    let step = validate_definition(events, &spec)?;
    let index = schedule.definitions.len() as i64;
    let props = DispositionActionDefinition::properties_from(&spec, step, index);
    let id = store.create_node(
        Some(&schedule.id),
        &ASSOC_DISPOSITION_ACTION_DEFINITIONS,
        NodeKind::DispositionActionDefinition,
        step.as_str(),
        props,
    )?;
    debug!(category = %category, step = %step, index, "disposition step added");

    for item in get_disposable_items(store, &schedule) {
        let untouched = get_next_disposition_action(store, &item).is_none()
            && get_completed_disposition_actions(store, &item).is_empty();
        if !store.has_aspect(&item, &ASPECT_DISPOSITION_LIFECYCLE) || untouched {
            initialise_disposition_lifecycle(ctx, store, events, &item)?;
        }
    }
    DispositionActionDefinition::read(store, &id)
}

fn validate_definition(events: &EventRegistry, spec: &ActionDefinitionSpec) -> Result<DispositionStep> {
    if spec.name.trim().is_empty() {
        return Err(RetentionError::InvalidDefinition("step name is required".into()));
    }
    let step: DispositionStep = spec.name.trim().parse()?;
    for event in &spec.events {
        if !events.exists_event(event) {
            return Err(RetentionError::EventNotFound(event.clone()));
        }
    }
    if spec.period.is_none() && spec.events.is_empty() {
        return Err(RetentionError::InvalidDefinition(format!(
            "step '{step}' needs a period or at least one event"
        )));
    }
    Ok(step)
}

/// Replace the settings of an existing step, keeping its position. Items
/// whose pending action came from this step are refreshed against it.
pub fn update_disposition_action_definition(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    events: &EventRegistry,
    category: &NodeId,
    definition: &NodeId,
    spec: ActionDefinitionSpec,
) -> Result<DispositionActionDefinition> {
    let schedule = require_own_schedule(store, category)?;
    let index = schedule
        .definition(definition)
        .map(|d| d.index)
        .ok_or_else(|| {
            RetentionError::InvalidDefinition(format!("{definition} is not a step of this schedule"))
        })?;
    let step = validate_definition(events, &spec)?;
    let props = DispositionActionDefinition::properties_from(&spec, step, index);
    for optional in [
        PROP_DISPOSITION_DESCRIPTION,
        PROP_DISPOSITION_PERIOD,
        PROP_DISPOSITION_PERIOD_PROPERTY,
    ] {
        if !props.contains_key(&optional) {
            store.set_property(definition, &optional, None)?;
        }
    }
    store.add_properties(definition, props)?;

    let mut refreshed = 0;
    for item in get_disposable_items(store, &schedule) {
        let pending = get_next_disposition_action(store, &item);
        if pending.is_some_and(|a| &a.definition_id == definition) {
            refresh_disposition_action(ctx, store, events, &item)?;
            refreshed += 1;
        }
    }
    info!(category = %category, step = %step, refreshed, "disposition step updated");
    DispositionActionDefinition::read(store, definition)
}

/// Remove a step. Refused while the schedule governs disposable items.
pub fn remove_disposition_action_definition(
    store: &mut dyn NodeStore,
    category: &NodeId,
    definition: &NodeId,
) -> Result<()> {
    let schedule = require_own_schedule(store, category)?;
    if schedule.definition(definition).is_none() {
        return Err(RetentionError::InvalidDefinition(format!(
            "{definition} is not a step of this schedule"
        )));
    }
    if !get_disposable_items(store, &schedule).is_empty() {
        return Err(RetentionError::DisposableItemsPresent(schedule.id.to_string()));
    }
    store.delete_node(definition)?;
    let remaining = schedule.definitions.iter().filter(|d| &d.id != definition);
    for (index, def) in remaining.enumerate() {
        store.set_property(&def.id, &PROP_DISPOSITION_INDEX, Some((index as i64).into()))?;
    }
    Ok(())
}

/// Primary descendants of `root` of the given kind, not descending into
/// categories that carry their own schedule.
fn items_under(store: &dyn NodeStore, root: &NodeId, kind: NodeKind) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(current) = stack.pop() {
        for child in store.children(&current, Some(&ASSOC_CONTAINS)) {
            match store.kind(&child) {
                Some(k) if k == kind => out.push(child),
                Some(NodeKind::RecordCategory) if own_schedule(store, &child).is_some() => {}
                Some(NodeKind::RecordCategory) | Some(NodeKind::RecordFolder) => stack.push(child),
                _ => {}
            }
        }
    }
    out
}

pub fn get_disposable_items(store: &dyn NodeStore, schedule: &DispositionSchedule) -> Vec<NodeId> {
    items_under(store, &schedule.category, schedule.disposable_kind())
}

/// Whether `node` is a disposable item of the schedule governing it.
pub fn is_disposable_item(store: &dyn NodeStore, node: &NodeId) -> bool {
    match (store.kind(node), get_disposition_schedule(store, node)) {
        (Some(kind), Some(schedule)) => kind == schedule.disposable_kind(),
        _ => false,
    }
}

/// Trigger events referenced by any step of any schedule.
pub fn events_in_use(store: &dyn NodeStore) -> BTreeSet<String> {
    store
        .nodes_of_kind(NodeKind::DispositionActionDefinition)
        .iter()
        .filter_map(|d| DispositionActionDefinition::read(store, d).ok())
        .flat_map(|d| d.events)
        .collect()
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

pub fn get_next_disposition_action(store: &dyn NodeStore, node: &NodeId) -> Option<DispositionAction> {
    let id = store
        .children(node, Some(&ASSOC_NEXT_DISPOSITION_ACTION))
        .into_iter()
        .next()?;
    DispositionAction::read(store, &id).ok()
}

/// Definition of the pending action on `node`.
pub fn get_disposition_action_definition(
    store: &dyn NodeStore,
    node: &NodeId,
) -> Option<DispositionActionDefinition> {
    let action = get_next_disposition_action(store, node)?;
    DispositionActionDefinition::read(store, &action.definition_id).ok()
}

/// Completed actions, oldest first.
pub fn get_completed_disposition_actions(
    store: &dyn NodeStore,
    node: &NodeId,
) -> Vec<DispositionAction> {
    store
        .children(node, Some(&ASSOC_DISPOSITION_ACTION_HISTORY))
        .iter()
        .filter_map(|a| DispositionAction::read(store, a).ok())
        .collect()
}

pub fn get_last_completed_disposition_action(
    store: &dyn NodeStore,
    node: &NodeId,
) -> Option<DispositionAction> {
    get_completed_disposition_actions(store, node).pop()
}

/// The as-of date a new action for `definition` on `node` starts with.
///
/// `rma:dispositionAsOf` anchors on the completion of the previous step (or
/// the node's own value before any step completed); other period properties
/// are read from the node and may still be unset. Without a period property,
/// `immediately` anchors on the creation date and anything else on `now`.
pub fn calculate_as_of_date(
    store: &dyn NodeStore,
    node: &NodeId,
    definition: &DispositionActionDefinition,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let period = definition.period?;
    let anchor = match &definition.period_property {
        Some(property) if *property == PROP_DISPOSITION_AS_OF => {
            match get_last_completed_disposition_action(store, node) {
                Some(last) => last.completed_at,
                None => store.date_property(node, property),
            }
        }
        Some(property) => store.date_property(node, property),
        None if period.period_type == PeriodType::Immediately => {
            store.date_property(node, &PROP_CREATED)
        }
        None => Some(now),
    };
    anchor.and_then(|a| period.next_date(a))
}

fn create_action(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    events: &EventRegistry,
    node: &NodeId,
    definition: &DispositionActionDefinition,
) -> Result<DispositionAction> {
    let mut props = Properties::new();
    props.insert(PROP_DISPOSITION_ACTION_ID, definition.id.to_string().into());
    props.insert(PROP_DISPOSITION_ACTION, definition.name.as_str().into());
    if let Some(as_of) = calculate_as_of_date(store, node, definition, ctx.now()) {
        props.insert(PROP_DISPOSITION_AS_OF, as_of.into());
    }
    let action = store.create_node(
        Some(node),
        &ASSOC_NEXT_DISPOSITION_ACTION,
        NodeKind::DispositionAction,
        definition.name.as_str(),
        props,
    )?;
    for event in &definition.events {
        create_event_execution(store, events, &action, event)?;
    }
    let action = DispositionAction::read(store, &action)?;
    debug!(node = %node, step = %action.name, as_of = ?action.as_of, "disposition action created");
    Ok(action)
}

fn create_event_execution(
    store: &mut dyn NodeStore,
    events: &EventRegistry,
    action: &NodeId,
    event: &str,
) -> Result<NodeId> {
    let mut props = Properties::new();
    props.insert(PROP_EVENT_EXECUTION_NAME, event.into());
    props.insert(PROP_EVENT_EXECUTION_AUTOMATIC, events.is_automatic(event).into());
    props.insert(PROP_EVENT_EXECUTION_COMPLETE, false.into());
    store.create_node(
        Some(action),
        &ASSOC_EVENT_EXECUTIONS,
        NodeKind::EventExecution,
        event,
        props,
    )
}

/// Re-read the pending action on `node` against its definition. Trigger
/// events follow the definition's list, keeping the completion state of
/// events that stay, and the as-of date is recalculated. An item with no
/// pending action is initialised instead.
pub fn refresh_disposition_action(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    events: &EventRegistry,
    node: &NodeId,
) -> Result<Option<DispositionAction>> {
    let Some(action) = get_next_disposition_action(store, node) else {
        return initialise_disposition_lifecycle(ctx, store, events, node);
    };
    let definition = DispositionActionDefinition::read(store, &action.definition_id)?;
    store.set_property(
        &action.id,
        &PROP_DISPOSITION_ACTION,
        Some(definition.name.as_str().into()),
    )?;
    for completion in &action.events {
        if !definition.events.contains(&completion.event_name) {
            store.delete_node(&completion.id)?;
        }
    }
    for event in &definition.events {
        if action.event(event).is_none() {
            create_event_execution(store, events, &action.id, event)?;
        }
    }

    let action = DispositionAction::read(store, &action.id)?;
    let first = definition.eligible_on_first_complete_event;
    let by_events = if action.events_satisfied(first) {
        let fired = action.events.iter().filter(|e| e.complete).filter_map(|e| e.completed_at);
        let fired = if first { fired.min() } else { fired.max() };
        fired.or(Some(ctx.now()))
    } else {
        None
    };
    let as_of = match definition.period {
        Some(_) => calculate_as_of_date(store, node, &definition, ctx.now()).or(by_events),
        None => by_events,
    };
    store.set_property(&action.id, &PROP_DISPOSITION_AS_OF, as_of.map(PropertyValue::from))?;
    debug!(node = %node, step = %definition.name, as_of = ?as_of, "disposition action refreshed");
    DispositionAction::read(store, &action.id).map(Some)
}

/// Give a disposable item its lifecycle: the marker aspect and, when it has
/// none yet, the first pending action. Returns the pending action.
pub fn initialise_disposition_lifecycle(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    events: &EventRegistry,
    node: &NodeId,
) -> Result<Option<DispositionAction>> {
    let Some(schedule) = get_disposition_schedule(store, node) else {
        return Ok(None);
    };
    if store.kind(node) != Some(schedule.disposable_kind()) {
        return Ok(None);
    }
    if !store.has_aspect(node, &ASPECT_DISPOSITION_LIFECYCLE) {
        store.add_aspect(node, &ASPECT_DISPOSITION_LIFECYCLE, Properties::new())?;
    }
    if let Some(pending) = get_next_disposition_action(store, node) {
        return Ok(Some(pending));
    }
    if !get_completed_disposition_actions(store, node).is_empty() {
        return Ok(None);
    }
    match schedule.definitions.first() {
        Some(first) => create_action(ctx, store, events, node, first).map(Some),
        None => Ok(None),
    }
}

/// Complete the pending action into history and create the next one.
/// Returns the completed action and its successor.
pub fn update_next_disposition_action(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    events: &EventRegistry,
    node: &NodeId,
) -> Result<(Option<DispositionAction>, Option<DispositionAction>)> {
    let schedule = get_disposition_schedule(store, node)
        .ok_or_else(|| RetentionError::ScheduleNotFound(node.to_string()))?;
    let Some(current) = get_next_disposition_action(store, node) else {
        let next = initialise_disposition_lifecycle(ctx, store, events, node)?;
        return Ok((None, next));
    };

    let now = ctx.now();
    if current.started_at.is_none() {
        store.set_property(&current.id, &PROP_DISPOSITION_ACTION_STARTED_AT, Some(now.into()))?;
        store.set_property(
            &current.id,
            &PROP_DISPOSITION_ACTION_STARTED_BY,
            Some(ctx.user().into()),
        )?;
    }
    store.set_property(&current.id, &PROP_DISPOSITION_ACTION_COMPLETED_AT, Some(now.into()))?;
    store.set_property(
        &current.id,
        &PROP_DISPOSITION_ACTION_COMPLETED_BY,
        Some(ctx.user().into()),
    )?;
    store.move_node(&current.id, node, &ASSOC_DISPOSITION_ACTION_HISTORY)?;
    let completed = DispositionAction::read(store, &current.id)?;

    let next = match schedule.definition_after(&current.definition_id) {
        Some(definition) => Some(create_action(ctx, store, events, node, definition)?),
        None => None,
    };
    Ok((Some(completed), next))
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

fn pending_with_event(
    store: &dyn NodeStore,
    node: &NodeId,
    event: &str,
) -> Result<(DispositionAction, EventCompletion)> {
    let action = get_next_disposition_action(store, node)
        .ok_or_else(|| RetentionError::NoPendingAction(node.to_string()))?;
    let completion = action.event(event).cloned().ok_or_else(|| {
        RetentionError::EventNotApplicable {
            node: node.to_string(),
            event: event.to_string(),
        }
    })?;
    Ok((action, completion))
}

fn first_complete_rule(store: &dyn NodeStore, action: &DispositionAction) -> bool {
    DispositionActionDefinition::read(store, &action.definition_id)
        .map(|d| d.eligible_on_first_complete_event)
        .unwrap_or(true)
}

/// Mark a trigger event of the pending action complete. When that makes the
/// action event-eligible and it has no as-of date yet, the as-of date becomes
/// the firing time. Completing an already complete event changes nothing.
pub fn complete_event(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    node: &NodeId,
    event: &str,
) -> Result<DispositionAction> {
    let (action, completion) = pending_with_event(store, node, event)?;
    if completion.complete {
        debug!(node = %node, event, "event already complete");
        return Ok(action);
    }
    let now = ctx.now();
    store.set_property(&completion.id, &PROP_EVENT_EXECUTION_COMPLETE, Some(true.into()))?;
    store.set_property(&completion.id, &PROP_EVENT_EXECUTION_COMPLETED_AT, Some(now.into()))?;
    store.set_property(
        &completion.id,
        &PROP_EVENT_EXECUTION_COMPLETED_BY,
        Some(ctx.user().into()),
    )?;

    let action = DispositionAction::read(store, &action.id)?;
    if action.as_of.is_none() && action.events_satisfied(first_complete_rule(store, &action)) {
        store.set_property(&action.id, &PROP_DISPOSITION_AS_OF, Some(now.into()))?;
        debug!(node = %node, event, as_of = %now, "event fired, action eligible");
    }
    info!(node = %node, event, "event completed");
    DispositionAction::read(store, &action.id)
}

/// Mark a completed trigger event incomplete again. An event-driven as-of
/// date is withdrawn when the events no longer hold.
pub fn undo_event(
    store: &mut dyn NodeStore,
    node: &NodeId,
    event: &str,
) -> Result<DispositionAction> {
    let (action, completion) = pending_with_event(store, node, event)?;
    if !completion.complete {
        return Ok(action);
    }
    store.set_property(&completion.id, &PROP_EVENT_EXECUTION_COMPLETE, Some(false.into()))?;
    store.set_property(&completion.id, &PROP_EVENT_EXECUTION_COMPLETED_AT, None)?;
    store.set_property(&completion.id, &PROP_EVENT_EXECUTION_COMPLETED_BY, None)?;

    let action = DispositionAction::read(store, &action.id)?;
    let period_driven = DispositionActionDefinition::read(store, &action.definition_id)
        .map(|d| d.period.is_some())
        .unwrap_or(false);
    if !period_driven && !action.events_satisfied(first_complete_rule(store, &action)) {
        store.set_property(&action.id, &PROP_DISPOSITION_AS_OF, None)?;
    }
    info!(node = %node, event, "event undone");
    DispositionAction::read(store, &action.id)
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Whether the pending action may run at `now`: its as-of date has been
/// reached, or its trigger events are satisfied.
pub fn is_next_disposition_action_eligible(
    store: &dyn NodeStore,
    node: &NodeId,
    now: DateTime<Utc>,
) -> bool {
    if get_disposition_schedule(store, node).is_none()
        || !store.has_aspect(node, &ASPECT_DISPOSITION_LIFECYCLE)
    {
        return false;
    }
    let Some(action) = get_next_disposition_action(store, node) else {
        return false;
    };
    if action.as_of.is_some_and(|as_of| as_of <= now) {
        return true;
    }
    action.events_satisfied(first_complete_rule(store, &action))
}

/// Run the pending action. A held item is left untouched and reported as
/// [`ExecutionOutcome::Frozen`]; that is not an error.
pub fn execute_next_disposition_action(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    events: &EventRegistry,
    node: &NodeId,
) -> Result<ExecutionOutcome> {
    store.require(node)?;
    let Some(action) = get_next_disposition_action(store, node) else {
        return Ok(ExecutionOutcome::NothingPending);
    };
    if is_frozen_or_has_frozen_children(store, node) {
        info!(node = %node, step = %action.name, "item is held, disposition skipped");
        return Ok(ExecutionOutcome::Frozen { action });
    }
    if !is_next_disposition_action_eligible(store, node, ctx.now()) {
        return Ok(ExecutionOutcome::NotEligible { action });
    }

    apply_step(ctx, store, node, action.name)?;
    let (completed, next) = update_next_disposition_action(ctx, store, events, node)?;
    let completed = completed.ok_or_else(|| RetentionError::NoPendingAction(node.to_string()))?;
    info!(node = %node, step = %completed.name, "disposition step executed");
    Ok(ExecutionOutcome::Executed { completed, next })
}

/// Whether holds block disposition of `node`: it is held itself or, for a
/// folder, any record filed in it is.
pub fn is_frozen_or_has_frozen_children(store: &dyn NodeStore, node: &NodeId) -> bool {
    if hold::is_frozen(store, node) {
        return true;
    }
    store.kind(node) == Some(NodeKind::RecordFolder)
        && store
            .children(node, Some(&ASSOC_CONTAINS))
            .iter()
            .any(|c| store.kind(c) == Some(NodeKind::Record) && hold::is_frozen(store, c))
}

pub fn is_disposable_item_cutoff(store: &dyn NodeStore, node: &NodeId) -> bool {
    store.has_aspect(node, &ASPECT_CUT_OFF)
}

/// Cut off a disposable item now, whatever its schedule says. A pending
/// cutoff step is completed and its successor created; any other pending
/// step is left in place. Returns the pending action afterwards.
pub fn cutoff_disposable_item(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    events: &EventRegistry,
    node: &NodeId,
) -> Result<Option<DispositionAction>> {
    store.require(node)?;
    if !is_disposable_item(store, node) {
        return Err(RetentionError::NotDisposableItem(node.to_string()));
    }
    if is_disposable_item_cutoff(store, node) {
        return Err(RetentionError::AlreadyCutOff(node.to_string()));
    }
    if is_frozen_or_has_frozen_children(store, node) {
        return Err(RetentionError::ItemFrozen(node.to_string()));
    }
    apply_step(ctx, store, node, DispositionStep::Cutoff)?;
    let pending = get_next_disposition_action(store, node);
    if pending.as_ref().is_some_and(|a| a.name == DispositionStep::Cutoff) {
        let (_, next) = update_next_disposition_action(ctx, store, events, node)?;
        info!(node = %node, "cut off, pending cutoff step completed");
        return Ok(next);
    }
    info!(node = %node, "cut off");
    Ok(pending)
}

fn apply_step(
    ctx: &OperationContext,
    store: &mut dyn NodeStore,
    node: &NodeId,
    step: DispositionStep,
) -> Result<()> {
    let (aspect, property): (QName, QName) = match step {
        DispositionStep::Cutoff => (ASPECT_CUT_OFF, PROP_CUT_OFF_DATE),
        DispositionStep::Transfer => (ASPECT_TRANSFERRED, PROP_TRANSFERRED_AT),
        DispositionStep::Accession => (ASPECT_ACCESSIONED, PROP_ACCESSIONED_AT),
        DispositionStep::Destroy => (ASPECT_DESTROYED, PROP_DESTROYED_AT),
        DispositionStep::Retain => return Ok(()),
    };
    let mut targets = vec![node.clone()];
    if step == DispositionStep::Cutoff && store.kind(node) == Some(NodeKind::RecordFolder) {
        targets.extend(
            store
                .children(node, Some(&ASSOC_CONTAINS))
                .into_iter()
                .filter(|c| store.kind(c) == Some(NodeKind::Record)),
        );
    }
    for target in targets {
        let mut props = Properties::new();
        props.insert(property.clone(), PropertyValue::Date(ctx.now()));
        store.add_aspect(&target, &aspect, props)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, SIMPLE_EVENT_TYPE};
    use crate::model::PROP_DATE_FILED;
    use crate::period::Period;
    use crate::store::InMemoryStore;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    struct Fixture {
        store: InMemoryStore,
        events: EventRegistry,
        ctx: OperationContext,
        category: NodeId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut store = InMemoryStore::new();
            let plan = store
                .create_node(None, &ASSOC_CONTAINS, NodeKind::FilePlan, "plan", Properties::new())
                .unwrap();
            let category = store
                .create_node(Some(&plan), &ASSOC_CONTAINS, NodeKind::RecordCategory, "Contracts", Properties::new())
                .unwrap();
            let mut events = EventRegistry::new();
            events
                .register_event_type(EventType::new(SIMPLE_EVENT_TYPE, false))
                .unwrap();
            events.add_event(SIMPLE_EVENT_TYPE, "case_closed", "Case Closed").unwrap();
            events.add_event(SIMPLE_EVENT_TYPE, "abolished", "Abolished").unwrap();
            Fixture {
                store,
                events,
                ctx: OperationContext::new("alice").at(at("2024-01-10T00:00:00Z")),
                category,
            }
        }

        fn folder(&mut self, name: &str) -> NodeId {
            let folder = self
                .store
                .create_node(Some(&self.category), &ASSOC_CONTAINS, NodeKind::RecordFolder, name, Properties::new())
                .unwrap();
            initialise_disposition_lifecycle(&self.ctx, &mut self.store, &self.events, &folder).unwrap();
            folder
        }

        fn step(&mut self, spec: ActionDefinitionSpec) -> DispositionActionDefinition {
            add_disposition_action_definition(&self.ctx, &mut self.store, &self.events, &self.category, spec)
                .unwrap()
        }
    }

    fn event_step(name: &str, events: &[&str]) -> ActionDefinitionSpec {
        ActionDefinitionSpec {
            name: name.into(),
            events: events.iter().map(|e| e.to_string()).collect(),
            eligible_on_first_complete_event: true,
            ..Default::default()
        }
    }

    fn period_step(name: &str, period: &str, property: QName) -> ActionDefinitionSpec {
        ActionDefinitionSpec {
            name: name.into(),
            period: Some(period.parse::<Period>().unwrap()),
            period_property: Some(property),
            ..Default::default()
        }
    }

    #[test]
    fn one_schedule_per_category() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        assert!(f.store.has_aspect(&f.category, &ASPECT_SCHEDULED));
        assert!(matches!(
            create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()),
            Err(RetentionError::ScheduleExists(_))
        ));
    }

    #[test]
    fn schedule_is_inherited_by_folders_and_records() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        let folder = f.folder("F");
        let record = f
            .store
            .create_node(Some(&folder), &ASSOC_CONTAINS, NodeKind::Record, "r", Properties::new())
            .unwrap();
        let schedule = get_disposition_schedule(&f.store, &record).unwrap();
        assert_eq!(schedule.category, f.category);
        assert!(is_disposable_item(&f.store, &folder));
        assert!(!is_disposable_item(&f.store, &record));
        assert_eq!(get_disposable_items(&f.store, &schedule), vec![folder]);
    }

    #[test]
    fn definition_validation() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        let err = add_disposition_action_definition(
            &f.ctx,
            &mut f.store,
            &f.events,
            &f.category,
            event_step("shred", &["case_closed"]),
        )
        .unwrap_err();
        assert!(matches!(err, RetentionError::UnknownDispositionStep(_)));

        let err = add_disposition_action_definition(
            &f.ctx,
            &mut f.store,
            &f.events,
            &f.category,
            event_step("cutoff", &["no_such_event"]),
        )
        .unwrap_err();
        assert!(matches!(err, RetentionError::EventNotFound(_)));

        let err = add_disposition_action_definition(
            &f.ctx,
            &mut f.store,
            &f.events,
            &f.category,
            event_step("", &[]),
        )
        .unwrap_err();
        assert!(matches!(err, RetentionError::InvalidDefinition(_)));
    }

    #[test]
    fn adding_first_step_initialises_existing_folders() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        let folder = f.folder("F");
        assert!(get_next_disposition_action(&f.store, &folder).is_none());

        f.step(event_step("cutoff", &["case_closed"]));
        let pending = get_next_disposition_action(&f.store, &folder).unwrap();
        assert_eq!(pending.name, DispositionStep::Cutoff);
        assert_eq!(pending.as_of, None);
        assert_eq!(pending.events.len(), 1);
        assert_eq!(events_in_use(&f.store), BTreeSet::from(["case_closed".to_string()]));
    }

    #[test]
    fn firing_event_sets_as_of_once() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        f.step(event_step("cutoff", &["case_closed"]));
        let folder = f.folder("F");

        let fired = complete_event(&f.ctx, &mut f.store, &folder, "case_closed").unwrap();
        assert_eq!(fired.as_of, Some(at("2024-01-10T00:00:00Z")));

        let later = OperationContext::new("bob").at(at("2024-06-01T00:00:00Z"));
        let again = complete_event(&later, &mut f.store, &folder, "case_closed").unwrap();
        assert_eq!(again.as_of, fired.as_of);
        assert_eq!(again.event("case_closed").unwrap().completed_by.as_deref(), Some("alice"));

        assert!(matches!(
            complete_event(&f.ctx, &mut f.store, &folder, "abolished"),
            Err(RetentionError::EventNotApplicable { .. })
        ));
    }

    #[test]
    fn all_events_required_when_not_first_complete() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        let mut spec = event_step("cutoff", &["case_closed", "abolished"]);
        spec.eligible_on_first_complete_event = false;
        f.step(spec);
        let folder = f.folder("F");

        let a = complete_event(&f.ctx, &mut f.store, &folder, "case_closed").unwrap();
        assert_eq!(a.as_of, None);
        assert!(!is_next_disposition_action_eligible(&f.store, &folder, f.ctx.now()));
        let a = complete_event(&f.ctx, &mut f.store, &folder, "abolished").unwrap();
        assert!(a.as_of.is_some());

        let undone = undo_event(&mut f.store, &folder, "abolished").unwrap();
        assert_eq!(undone.as_of, None);
        assert!(!undone.event("abolished").unwrap().complete);
    }

    #[test]
    fn period_step_anchors_on_previous_completion() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        f.step(event_step("cutoff", &["case_closed"]));
        f.step(period_step("destroy", "year|5", PROP_DISPOSITION_AS_OF));
        let folder = f.folder("F");

        complete_event(&f.ctx, &mut f.store, &folder, "case_closed").unwrap();
        let outcome = execute_next_disposition_action(&f.ctx, &mut f.store, &f.events, &folder).unwrap();
        let ExecutionOutcome::Executed { completed, next } = outcome else {
            panic!("expected execution, got {outcome:?}");
        };
        assert_eq!(completed.name, DispositionStep::Cutoff);
        assert_eq!(completed.completed_by.as_deref(), Some("alice"));
        let next = next.unwrap();
        assert_eq!(next.name, DispositionStep::Destroy);
        assert_eq!(next.as_of, Some(at("2029-01-10T00:00:00Z")));
        assert!(f.store.has_aspect(&folder, &ASPECT_CUT_OFF));
        assert_eq!(
            get_last_completed_disposition_action(&f.store, &folder).unwrap().id,
            completed.id
        );
    }

    #[test]
    fn property_anchor_may_be_unset() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        f.step(period_step("cutoff", "month|6", PROP_DATE_FILED));
        let folder = f.folder("F");
        let pending = get_next_disposition_action(&f.store, &folder).unwrap();
        assert_eq!(pending.as_of, None);

        let def = get_disposition_action_definition(&f.store, &folder).unwrap();
        f.store
            .set_property(&folder, &PROP_DATE_FILED, Some(at("2024-02-01T00:00:00Z").into()))
            .unwrap();
        assert_eq!(
            calculate_as_of_date(&f.store, &folder, &def, f.ctx.now()),
            Some(at("2024-08-01T00:00:00Z"))
        );
    }

    #[test]
    fn execution_waits_for_as_of() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        let mut spec = period_step("retain", "day|30", PROP_DISPOSITION_AS_OF);
        spec.period_property = None;
        f.step(spec);
        let folder = f.folder("F");

        let outcome = execute_next_disposition_action(&f.ctx, &mut f.store, &f.events, &folder).unwrap();
        assert!(matches!(outcome, ExecutionOutcome::NotEligible { .. }));

        let later = OperationContext::new("alice").at(at("2024-02-09T00:00:00Z"));
        let outcome = execute_next_disposition_action(&later, &mut f.store, &f.events, &folder).unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Executed { next: None, .. }));
        let outcome = execute_next_disposition_action(&later, &mut f.store, &f.events, &folder).unwrap();
        assert_eq!(outcome, ExecutionOutcome::NothingPending);
    }

    #[test]
    fn held_items_are_not_executed() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        f.step(event_step("cutoff", &["case_closed"]));
        let folder = f.folder("F");
        complete_event(&f.ctx, &mut f.store, &folder, "case_closed").unwrap();

        let plan = f.store.primary_parent(&f.category).unwrap().parent;
        let hold = hold::create_hold(&mut f.store, &plan, "h", "audit", None).unwrap();
        hold::add_to_hold(&f.ctx, &mut f.store, &hold, &folder).unwrap();

        let outcome = execute_next_disposition_action(&f.ctx, &mut f.store, &f.events, &folder).unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Frozen { .. }));
        assert!(!f.store.has_aspect(&folder, &ASPECT_CUT_OFF));

        hold::remove_from_hold(&f.ctx, &mut f.store, &hold, &folder).unwrap();
        let outcome = execute_next_disposition_action(&f.ctx, &mut f.store, &f.events, &folder).unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Executed { .. }));
    }

    #[test]
    fn remove_definition_refused_with_items() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        let cutoff = f.step(event_step("cutoff", &["case_closed"]));
        let destroy = f.step(period_step("destroy", "year|1", PROP_DISPOSITION_AS_OF));
        remove_disposition_action_definition(&mut f.store, &f.category, &cutoff.id).unwrap();
        let schedule = get_disposition_schedule(&f.store, &f.category).unwrap();
        assert_eq!(schedule.definitions.len(), 1);
        assert_eq!(schedule.definitions[0].id, destroy.id);
        assert_eq!(schedule.definitions[0].index, 0);

        f.folder("F");
        assert!(matches!(
            remove_disposition_action_definition(&mut f.store, &f.category, &destroy.id),
            Err(RetentionError::DisposableItemsPresent(_))
        ));
    }

    #[test]
    fn held_record_blocks_folder_disposition() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        f.step(event_step("cutoff", &["case_closed"]));
        let folder = f.folder("F");
        let record = f
            .store
            .create_node(Some(&folder), &ASSOC_CONTAINS, NodeKind::Record, "r", Properties::new())
            .unwrap();
        complete_event(&f.ctx, &mut f.store, &folder, "case_closed").unwrap();

        let plan = f.store.primary_parent(&f.category).unwrap().parent;
        let hold = hold::create_hold(&mut f.store, &plan, "h", "audit", None).unwrap();
        hold::add_to_hold(&f.ctx, &mut f.store, &hold, &record).unwrap();
        assert!(!hold::is_frozen(&f.store, &folder));
        assert!(is_frozen_or_has_frozen_children(&f.store, &folder));

        let outcome = execute_next_disposition_action(&f.ctx, &mut f.store, &f.events, &folder).unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Frozen { .. }));
        assert!(!f.store.has_aspect(&folder, &ASPECT_CUT_OFF));
        assert!(!f.store.has_aspect(&record, &ASPECT_CUT_OFF));
        assert!(matches!(
            cutoff_disposable_item(&f.ctx, &mut f.store, &f.events, &folder),
            Err(RetentionError::ItemFrozen(_))
        ));
    }

    #[test]
    fn manual_cutoff_completes_pending_cutoff() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        f.step(event_step("cutoff", &["case_closed"]));
        f.step(period_step("destroy", "year|5", PROP_DISPOSITION_AS_OF));
        let folder = f.folder("F");
        let record = f
            .store
            .create_node(Some(&folder), &ASSOC_CONTAINS, NodeKind::Record, "r", Properties::new())
            .unwrap();
        assert!(!is_disposable_item_cutoff(&f.store, &folder));

        let next = cutoff_disposable_item(&f.ctx, &mut f.store, &f.events, &folder)
            .unwrap()
            .unwrap();
        assert_eq!(next.name, DispositionStep::Destroy);
        assert_eq!(next.as_of, Some(at("2029-01-10T00:00:00Z")));
        assert!(is_disposable_item_cutoff(&f.store, &folder));
        assert!(f.store.has_aspect(&record, &ASPECT_CUT_OFF));
        let history = get_completed_disposition_actions(&f.store, &folder);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].name, DispositionStep::Cutoff);

        assert!(matches!(
            cutoff_disposable_item(&f.ctx, &mut f.store, &f.events, &folder),
            Err(RetentionError::AlreadyCutOff(_))
        ));
        assert!(matches!(
            cutoff_disposable_item(&f.ctx, &mut f.store, &f.events, &record),
            Err(RetentionError::NotDisposableItem(_))
        ));
    }

    #[test]
    fn manual_cutoff_leaves_other_pending_steps() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        f.step(period_step("retain", "year|1", PROP_DISPOSITION_AS_OF));
        let folder = f.folder("F");
        let pending = cutoff_disposable_item(&f.ctx, &mut f.store, &f.events, &folder)
            .unwrap()
            .unwrap();
        assert_eq!(pending.name, DispositionStep::Retain);
        assert!(get_completed_disposition_actions(&f.store, &folder).is_empty());
        assert!(is_disposable_item_cutoff(&f.store, &folder));
    }

    #[test]
    fn updating_step_refreshes_pending_actions() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        let cutoff = f.step(period_step("cutoff", "month|6", PROP_DATE_FILED));
        let folder = f.folder("F");
        f.store
            .set_property(&folder, &PROP_DATE_FILED, Some(at("2024-02-01T00:00:00Z").into()))
            .unwrap();

        let mut spec = period_step("cutoff", "year|1", PROP_DATE_FILED);
        spec.events = vec!["case_closed".into()];
        let updated = update_disposition_action_definition(
            &f.ctx, &mut f.store, &f.events, &f.category, &cutoff.id, spec,
        )
        .unwrap();
        assert_eq!(updated.index, 0);
        assert_eq!(updated.events, vec!["case_closed".to_string()]);
        let pending = get_next_disposition_action(&f.store, &folder).unwrap();
        assert_eq!(pending.as_of, Some(at("2025-02-01T00:00:00Z")));
        assert_eq!(pending.events.len(), 1);

        complete_event(&f.ctx, &mut f.store, &folder, "case_closed").unwrap();
        let updated = update_disposition_action_definition(
            &f.ctx,
            &mut f.store,
            &f.events,
            &f.category,
            &cutoff.id,
            event_step("cutoff", &["case_closed", "abolished"]),
        )
        .unwrap();
        assert_eq!(updated.period, None);
        assert_eq!(updated.period_property, None);
        let pending = get_next_disposition_action(&f.store, &folder).unwrap();
        assert!(pending.event("case_closed").unwrap().complete);
        assert!(!pending.event("abolished").unwrap().complete);
        assert_eq!(pending.as_of, Some(at("2024-01-10T00:00:00Z")));

        update_disposition_action_definition(
            &f.ctx,
            &mut f.store,
            &f.events,
            &f.category,
            &cutoff.id,
            event_step("cutoff", &["abolished"]),
        )
        .unwrap();
        let pending = get_next_disposition_action(&f.store, &folder).unwrap();
        assert!(pending.event("case_closed").is_none());
        assert_eq!(pending.as_of, None);
    }

    #[test]
    fn update_rejects_foreign_or_invalid_steps() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        let cutoff = f.step(event_step("cutoff", &["case_closed"]));
        let folder = f.folder("F");
        assert!(matches!(
            update_disposition_action_definition(
                &f.ctx,
                &mut f.store,
                &f.events,
                &f.category,
                &folder,
                event_step("cutoff", &["case_closed"]),
            ),
            Err(RetentionError::InvalidDefinition(_))
        ));
        assert!(matches!(
            update_disposition_action_definition(
                &f.ctx,
                &mut f.store,
                &f.events,
                &f.category,
                &cutoff.id,
                event_step("cutoff", &["no_such_event"]),
            ),
            Err(RetentionError::EventNotFound(_))
        ));
        let unchanged = get_next_disposition_action(&f.store, &folder).unwrap();
        assert_eq!(unchanged.events.len(), 1);
    }

    #[test]
    fn refresh_initialises_items_without_lifecycle() {
        let mut f = Fixture::new();
        create_disposition_schedule(&mut f.store, &f.category, ScheduleSpec::default()).unwrap();
        f.step(event_step("cutoff", &["case_closed"]));
        let folder = f
            .store
            .create_node(Some(&f.category), &ASSOC_CONTAINS, NodeKind::RecordFolder, "bare", Properties::new())
            .unwrap();
        assert!(get_next_disposition_action(&f.store, &folder).is_none());
        let pending = refresh_disposition_action(&f.ctx, &mut f.store, &f.events, &folder)
            .unwrap()
            .unwrap();
        assert_eq!(pending.name, DispositionStep::Cutoff);
        assert!(f.store.has_aspect(&folder, &ASPECT_DISPOSITION_LIFECYCLE));
    }
}
