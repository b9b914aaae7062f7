use crate::error::{Result, RetentionError};
use crate::model::{
    ASSOC_EVENT_EXECUTIONS, PROP_DISPOSITION_ACTION, PROP_DISPOSITION_ACTION_COMPLETED_AT,
    PROP_DISPOSITION_ACTION_COMPLETED_BY, PROP_DISPOSITION_ACTION_ID,
    PROP_DISPOSITION_ACTION_STARTED_AT, PROP_DISPOSITION_ACTION_STARTED_BY,
    PROP_DISPOSITION_AS_OF, PROP_EVENT_EXECUTION_AUTOMATIC, PROP_EVENT_EXECUTION_COMPLETE,
    PROP_EVENT_EXECUTION_COMPLETED_AT, PROP_EVENT_EXECUTION_COMPLETED_BY,
    PROP_EVENT_EXECUTION_NAME,
};
use crate::store::NodeStore;
use crate::types::{NodeId, NodeKind};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::schedule::DispositionStep;

/// Completion state of one trigger event on a disposition action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventCompletion {
    pub id: NodeId,
    pub event_name: String,
    pub automatic: bool,
    pub complete: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
}

impl EventCompletion {
    pub fn read(store: &dyn NodeStore, id: &NodeId) -> Result<Self> {
        store.require_kind(id, &[NodeKind::EventExecution])?;
        Ok(EventCompletion {
            id: id.clone(),
            event_name: store
                .text_property(id, &PROP_EVENT_EXECUTION_NAME)
                .unwrap_or_default(),
            automatic: store
                .bool_property(id, &PROP_EVENT_EXECUTION_AUTOMATIC)
                .unwrap_or(false),
            complete: store
                .bool_property(id, &PROP_EVENT_EXECUTION_COMPLETE)
                .unwrap_or(false),
            completed_at: store.date_property(id, &PROP_EVENT_EXECUTION_COMPLETED_AT),
            completed_by: store.text_property(id, &PROP_EVENT_EXECUTION_COMPLETED_BY),
        })
    }
}

/// A live or completed disposition step on a record or folder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispositionAction {
    pub id: NodeId,
    pub definition_id: NodeId,
    pub name: DispositionStep,
    pub as_of: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub started_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    pub events: Vec<EventCompletion>,
}

impl DispositionAction {
    pub fn read(store: &dyn NodeStore, id: &NodeId) -> Result<Self> {
        store.require_kind(id, &[NodeKind::DispositionAction])?;
        let definition_id = store
            .text_property(id, &PROP_DISPOSITION_ACTION_ID)
            .map(NodeId::new)
            .ok_or_else(|| RetentionError::InvalidDefinition(format!("{id} has no definition")))?;
        let name = store
            .text_property(id, &PROP_DISPOSITION_ACTION)
            .ok_or_else(|| RetentionError::InvalidDefinition(format!("{id} has no step name")))?
            .parse()?;
        let events = store
            .children(id, Some(&ASSOC_EVENT_EXECUTIONS))
            .iter()
            .map(|e| EventCompletion::read(store, e))
            .collect::<Result<Vec<_>>>()?;
        Ok(DispositionAction {
            id: id.clone(),
            definition_id,
            name,
            as_of: store.date_property(id, &PROP_DISPOSITION_AS_OF),
            started_at: store.date_property(id, &PROP_DISPOSITION_ACTION_STARTED_AT),
            started_by: store.text_property(id, &PROP_DISPOSITION_ACTION_STARTED_BY),
            completed_at: store.date_property(id, &PROP_DISPOSITION_ACTION_COMPLETED_AT),
            completed_by: store.text_property(id, &PROP_DISPOSITION_ACTION_COMPLETED_BY),
            events,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn event(&self, name: &str) -> Option<&EventCompletion> {
        self.events.iter().find(|e| e.event_name == name)
    }

    /// Whether the trigger events alone make the action eligible: any
    /// completed event when `first_complete` is set, otherwise all of them.
    /// An action without trigger events is never event-eligible.
    pub fn events_satisfied(&self, first_complete: bool) -> bool {
        if self.events.is_empty() {
            return false;
        }
        if first_complete {
            self.events.iter().any(|e| e.complete)
        } else {
            self.events.iter().all(|e| e.complete)
        }
    }
}
