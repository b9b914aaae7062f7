//! Disposition events and their types.
//!
//! Events are the named occurrences (case closed, superseded, ...) that a
//! disposition step can wait on. The registry lives in the project config,
//! not the node store.

use crate::error::{Result, RetentionError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SIMPLE_EVENT_TYPE: &str = "rmEventType.simple";
pub const SUPERSEDED_EVENT_TYPE: &str = "rmEventType.superseded";
pub const OBSOLETE_EVENT_TYPE: &str = "rmEventType.obsolete";
pub const VERSIONED_EVENT_TYPE: &str = "rmEventType.versioned";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventType {
    pub name: String,
    /// Fired by the system rather than completed by a user.
    #[serde(default)]
    pub automatic: bool,
}

impl EventType {
    pub fn new(name: impl Into<String>, automatic: bool) -> Self {
        EventType {
            name: name.into(),
            automatic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordsManagementEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub name: String,
    pub display_label: String,
}

/// Catalogue of event types and the named events usable as disposition
/// triggers. Event names are unique across the registry.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    types: BTreeMap<String, EventType>,
    events: BTreeMap<String, RecordsManagementEvent>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(
        types: &[EventType],
        events: &[RecordsManagementEvent],
    ) -> Result<Self> {
        let mut registry = Self::new();
        for t in types {
            registry.register_event_type(t.clone())?;
        }
        for e in events {
            registry.add_event(&e.event_type, &e.name, &e.display_label)?;
        }
        Ok(registry)
    }

    pub fn to_config(&self) -> (Vec<EventType>, Vec<RecordsManagementEvent>) {
        (
            self.types.values().cloned().collect(),
            self.events.values().cloned().collect(),
        )
    }

    // -- types --------------------------------------------------------------

    pub fn register_event_type(&mut self, event_type: EventType) -> Result<()> {
        if event_type.name.trim().is_empty() {
            return Err(RetentionError::InvalidEvent(
                "event type name must not be blank".to_string(),
            ));
        }
        if self.types.contains_key(&event_type.name) {
            return Err(RetentionError::EventTypeExists(event_type.name));
        }
        self.types.insert(event_type.name.clone(), event_type);
        Ok(())
    }

    pub fn get_event_type(&self, name: &str) -> Option<&EventType> {
        self.types.get(name)
    }

    pub fn get_event_types(&self) -> Vec<&EventType> {
        self.types.values().collect()
    }

    // -- events -------------------------------------------------------------

    pub fn add_event(
        &mut self,
        event_type: &str,
        name: &str,
        display_label: &str,
    ) -> Result<RecordsManagementEvent> {
        if !self.types.contains_key(event_type) {
            return Err(RetentionError::EventTypeNotFound(event_type.to_string()));
        }
        if self.events.contains_key(name) {
            return Err(RetentionError::EventExists(name.to_string()));
        }
        if !self.can_create_event(display_label, name) {
            return Err(RetentionError::InvalidEvent(format!(
                "name '{name}' and label '{display_label}' must be non-blank and unused"
            )));
        }
        let event = RecordsManagementEvent {
            event_type: event_type.to_string(),
            name: name.to_string(),
            display_label: display_label.to_string(),
        };
        self.events.insert(name.to_string(), event.clone());
        Ok(event)
    }

    /// Change the label and type of an existing event.
    pub fn edit_event(
        &mut self,
        name: &str,
        display_label: &str,
        event_type: &str,
    ) -> Result<RecordsManagementEvent> {
        if !self.events.contains_key(name) {
            return Err(RetentionError::EventNotFound(name.to_string()));
        }
        if !self.types.contains_key(event_type) {
            return Err(RetentionError::EventTypeNotFound(event_type.to_string()));
        }
        if !self.can_edit_event(display_label, name, event_type) {
            return Err(RetentionError::InvalidEvent(format!(
                "label '{display_label}' must be non-blank and unused"
            )));
        }
        let event = RecordsManagementEvent {
            event_type: event_type.to_string(),
            name: name.to_string(),
            display_label: display_label.to_string(),
        };
        self.events.insert(name.to_string(), event.clone());
        Ok(event)
    }

    /// Remove an event. Whether the event is still referenced by a schedule
    /// is checked by the caller.
    pub fn remove_event(&mut self, name: &str) -> Result<RecordsManagementEvent> {
        self.events
            .remove(name)
            .ok_or_else(|| RetentionError::EventNotFound(name.to_string()))
    }

    pub fn get_events(&self) -> Vec<&RecordsManagementEvent> {
        self.events.values().collect()
    }

    pub fn get_event(&self, name: &str) -> Option<&RecordsManagementEvent> {
        self.events.get(name)
    }

    pub fn exists_event(&self, name: &str) -> bool {
        self.events.contains_key(name)
    }

    pub fn is_automatic(&self, name: &str) -> bool {
        self.events
            .get(name)
            .and_then(|e| self.types.get(&e.event_type))
            .is_some_and(|t| t.automatic)
    }

    // -- validation ---------------------------------------------------------

    /// A new event needs a non-blank name and label, neither already taken.
    pub fn can_create_event(&self, display_label: &str, name: &str) -> bool {
        if name.trim().is_empty() || display_label.trim().is_empty() {
            return false;
        }
        !self.events.contains_key(name)
            && !self.events.values().any(|e| e.display_label == display_label)
    }

    /// An edit may keep its own label but not take another event's.
    pub fn can_edit_event(&self, display_label: &str, name: &str, event_type: &str) -> bool {
        if display_label.trim().is_empty() || event_type.trim().is_empty() {
            return false;
        }
        !self
            .events
            .values()
            .any(|e| e.display_label == display_label && e.name != name)
    }
}
