use crate::error::{Result, RetentionError};
use crate::model::{
    ASSOC_DISPOSITION_ACTION_DEFINITIONS, PROP_DISPOSITION_ACTION_NAME,
    PROP_DISPOSITION_AUTHORITY, PROP_DISPOSITION_DESCRIPTION, PROP_DISPOSITION_EVENT,
    PROP_DISPOSITION_EVENT_COMBINATION, PROP_DISPOSITION_INDEX, PROP_DISPOSITION_INSTRUCTIONS,
    PROP_DISPOSITION_PERIOD, PROP_DISPOSITION_PERIOD_PROPERTY, PROP_RECORD_LEVEL_DISPOSITION,
};
use crate::period::Period;
use crate::store::NodeStore;
use crate::types::{NodeId, NodeKind, Properties, PropertyValue, QName};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Event combination meaning "eligible on the first completed event".
pub const COMBINATION_OR: &str = "or";
/// Event combination meaning "eligible once every event completed".
pub const COMBINATION_AND: &str = "and";

// ---------------------------------------------------------------------------
// DispositionStep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispositionStep {
    Cutoff,
    Retain,
    Transfer,
    Accession,
    Destroy,
}

impl DispositionStep {
    pub fn all() -> &'static [DispositionStep] {
        &[
            DispositionStep::Cutoff,
            DispositionStep::Retain,
            DispositionStep::Transfer,
            DispositionStep::Accession,
            DispositionStep::Destroy,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DispositionStep::Cutoff => "cutoff",
            DispositionStep::Retain => "retain",
            DispositionStep::Transfer => "transfer",
            DispositionStep::Accession => "accession",
            DispositionStep::Destroy => "destroy",
        }
    }
}

impl fmt::Display for DispositionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispositionStep {
    type Err = RetentionError;

    fn from_str(s: &str) -> Result<Self> {
        DispositionStep::all()
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| RetentionError::UnknownDispositionStep(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ScheduleSpec {
    pub authority: Option<String>,
    pub instructions: Option<String>,
    /// Records, not folders, are the disposable items.
    pub record_level: bool,
}

impl ScheduleSpec {
    pub(crate) fn into_properties(self) -> Properties {
        let mut props = Properties::new();
        if let Some(authority) = self.authority {
            props.insert(PROP_DISPOSITION_AUTHORITY, authority.into());
        }
        if let Some(instructions) = self.instructions {
            props.insert(PROP_DISPOSITION_INSTRUCTIONS, instructions.into());
        }
        props.insert(PROP_RECORD_LEVEL_DISPOSITION, self.record_level.into());
        props
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActionDefinitionSpec {
    /// Step name; must name a [`DispositionStep`].
    pub name: String,
    pub description: Option<String>,
    pub period: Option<Period>,
    pub period_property: Option<QName>,
    pub events: Vec<String>,
    pub eligible_on_first_complete_event: bool,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispositionActionDefinition {
    pub id: NodeId,
    pub index: i64,
    pub name: DispositionStep,
    pub description: Option<String>,
    pub period: Option<Period>,
    pub period_property: Option<QName>,
    pub events: Vec<String>,
    pub eligible_on_first_complete_event: bool,
}

impl DispositionActionDefinition {
    pub fn read(store: &dyn NodeStore, id: &NodeId) -> Result<Self> {
        store.require_kind(id, &[NodeKind::DispositionActionDefinition])?;
        let name = store
            .text_property(id, &PROP_DISPOSITION_ACTION_NAME)
            .ok_or_else(|| RetentionError::InvalidDefinition(format!("{id} has no step name")))?;
        let period = store
            .text_property(id, &PROP_DISPOSITION_PERIOD)
            .map(|p| p.parse::<Period>())
            .transpose()?;
        let period_property = store
            .text_property(id, &PROP_DISPOSITION_PERIOD_PROPERTY)
            .map(QName::new)
            .transpose()?;
        let events = store
            .property(id, &PROP_DISPOSITION_EVENT)
            .and_then(PropertyValue::as_text_list)
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        let combination = store.text_property(id, &PROP_DISPOSITION_EVENT_COMBINATION);
        Ok(DispositionActionDefinition {
            id: id.clone(),
            index: store.int_property(id, &PROP_DISPOSITION_INDEX).unwrap_or(0),
            name: name.parse()?,
            description: store.text_property(id, &PROP_DISPOSITION_DESCRIPTION),
            period,
            period_property,
            events,
            eligible_on_first_complete_event: combination.as_deref() != Some(COMBINATION_AND),
        })
    }

    pub(crate) fn properties_from(spec: &ActionDefinitionSpec, step: DispositionStep, index: i64) -> Properties {
        let mut props = Properties::new();
        props.insert(PROP_DISPOSITION_ACTION_NAME, step.as_str().into());
        props.insert(PROP_DISPOSITION_INDEX, index.into());
        if let Some(description) = &spec.description {
            props.insert(PROP_DISPOSITION_DESCRIPTION, description.clone().into());
        }
        if let Some(period) = spec.period {
            props.insert(PROP_DISPOSITION_PERIOD, period.to_string().into());
        }
        if let Some(property) = &spec.period_property {
            props.insert(PROP_DISPOSITION_PERIOD_PROPERTY, property.to_string().into());
        }
        props.insert(PROP_DISPOSITION_EVENT, spec.events.clone().into());
        let combination = if spec.eligible_on_first_complete_event {
            COMBINATION_OR
        } else {
            COMBINATION_AND
        };
        props.insert(PROP_DISPOSITION_EVENT_COMBINATION, combination.into());
        props
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispositionSchedule {
    pub id: NodeId,
    /// The record category carrying the schedule.
    pub category: NodeId,
    pub authority: Option<String>,
    pub instructions: Option<String>,
    pub record_level: bool,
    /// Ordered by index.
    pub definitions: Vec<DispositionActionDefinition>,
}

impl DispositionSchedule {
    pub fn read(store: &dyn NodeStore, id: &NodeId) -> Result<Self> {
        store.require_kind(id, &[NodeKind::DispositionSchedule])?;
        let category = store
            .primary_parent(id)
            .map(|a| a.parent)
            .ok_or_else(|| RetentionError::ScheduleNotFound(id.to_string()))?;
        let mut definitions = store
            .children(id, Some(&ASSOC_DISPOSITION_ACTION_DEFINITIONS))
            .iter()
            .map(|d| DispositionActionDefinition::read(store, d))
            .collect::<Result<Vec<_>>>()?;
        definitions.sort_by_key(|d| d.index);
        Ok(DispositionSchedule {
            id: id.clone(),
            category,
            authority: store.text_property(id, &PROP_DISPOSITION_AUTHORITY),
            instructions: store.text_property(id, &PROP_DISPOSITION_INSTRUCTIONS),
            record_level: store
                .bool_property(id, &PROP_RECORD_LEVEL_DISPOSITION)
                .unwrap_or(false),
            definitions,
        })
    }

    pub fn definition(&self, id: &NodeId) -> Option<&DispositionActionDefinition> {
        self.definitions.iter().find(|d| &d.id == id)
    }

    pub fn definition_by_name(&self, step: DispositionStep) -> Option<&DispositionActionDefinition> {
        self.definitions.iter().find(|d| d.name == step)
    }

    /// The definition that follows `id` in schedule order.
    pub fn definition_after(&self, id: &NodeId) -> Option<&DispositionActionDefinition> {
        let pos = self.definitions.iter().position(|d| &d.id == id)?;
        self.definitions.get(pos + 1)
    }

    /// The kind of node this schedule disposes of.
    pub fn disposable_kind(&self) -> NodeKind {
        if self.record_level {
            NodeKind::Record
        } else {
            NodeKind::RecordFolder
        }
    }
}
