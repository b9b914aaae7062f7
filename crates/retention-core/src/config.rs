use crate::error::{Result, RetentionError};
use crate::event::{
    EventType, RecordsManagementEvent, OBSOLETE_EVENT_TYPE, SIMPLE_EVENT_TYPE,
    SUPERSEDED_EVENT_TYPE, VERSIONED_EVENT_TYPE,
};
use crate::model::{
    ASPECT_CUT_OFF, ASPECT_FROZEN, PROP_CUT_OFF_DATE, PROP_DATE_FILED, PROP_DISPOSITION_AS_OF,
    PROP_ORIGINATOR, PROP_REVIEW_AS_OF, PROP_REVIEW_PERIOD, PROP_VITAL_RECORD_INDICATOR,
};
use crate::paths;
use crate::security::ProtectedArtifact;
use crate::types::{Capability, QName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: String) -> Self {
        ConfigWarning {
            level: WarnLevel::Warning,
            message,
        }
    }

    fn error(message: String) -> Self {
        ConfigWarning {
            level: WarnLevel::Error,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// FilePlanConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePlanConfig {
    #[serde(default = "default_file_plan_name")]
    pub name: String,
}

fn default_file_plan_name() -> String {
    "File Plan".to_string()
}

impl Default for FilePlanConfig {
    fn default() -> Self {
        Self {
            name: default_file_plan_name(),
        }
    }
}

// ---------------------------------------------------------------------------
// ModelSecurityConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSecurityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_protected_properties")]
    pub protected_properties: Vec<ProtectedArtifact>,
    #[serde(default = "default_protected_aspects")]
    pub protected_aspects: Vec<ProtectedArtifact>,
}

fn default_true() -> bool {
    true
}

fn default_protected_properties() -> Vec<ProtectedArtifact> {
    use Capability::*;
    vec![
        ProtectedArtifact::new(
            PROP_CUT_OFF_DATE,
            [ApproveRecordsScheduledForCutoff, ManuallyChangeDispositionDates],
        ),
        ProtectedArtifact::new(PROP_DISPOSITION_AS_OF, [ManuallyChangeDispositionDates]),
        ProtectedArtifact::new(PROP_DATE_FILED, [EditDeclaredRecordMetadata, FileRecords])
            .always_allow_new(),
        ProtectedArtifact::new(PROP_ORIGINATOR, [EditRecordMetadata, FileRecords])
            .always_allow_new(),
        ProtectedArtifact::new(PROP_REVIEW_AS_OF, [UpdateVitalRecordCycleInformation, CycleVitalRecords]),
        ProtectedArtifact::new(PROP_REVIEW_PERIOD, [UpdateVitalRecordCycleInformation]),
        ProtectedArtifact::new(PROP_VITAL_RECORD_INDICATOR, [UpdateVitalRecordCycleInformation]),
    ]
}

fn default_protected_aspects() -> Vec<ProtectedArtifact> {
    vec![
        ProtectedArtifact::new(ASPECT_CUT_OFF, [Capability::ApproveRecordsScheduledForCutoff]),
        ProtectedArtifact::new(ASPECT_FROZEN, [Capability::ExtendRetentionPeriodOrFreeze]),
    ]
}

impl Default for ModelSecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            protected_properties: default_protected_properties(),
            protected_aspects: default_protected_aspects(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_types")]
    pub types: Vec<EventType>,
    #[serde(default = "default_events")]
    pub events: Vec<RecordsManagementEvent>,
}

fn default_event_types() -> Vec<EventType> {
    vec![
        EventType::new(SIMPLE_EVENT_TYPE, false),
        EventType::new(SUPERSEDED_EVENT_TYPE, true),
        EventType::new(OBSOLETE_EVENT_TYPE, true),
        EventType::new(VERSIONED_EVENT_TYPE, true),
    ]
}

fn default_events() -> Vec<RecordsManagementEvent> {
    let event = |event_type: &str, name: &str, label: &str| RecordsManagementEvent {
        event_type: event_type.to_string(),
        name: name.to_string(),
        display_label: label.to_string(),
    };
    vec![
        event(SIMPLE_EVENT_TYPE, "case_closed", "Case Closed"),
        event(SIMPLE_EVENT_TYPE, "abolished", "Abolished"),
        event(SIMPLE_EVENT_TYPE, "no_longer_needed", "No Longer Needed"),
        event(SUPERSEDED_EVENT_TYPE, "superseded", "Superseded"),
        event(OBSOLETE_EVENT_TYPE, "obsolete", "Obsolete"),
        event(VERSIONED_EVENT_TYPE, "versioned", "Versioned"),
    ]
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            types: default_event_types(),
            events: default_events(),
        }
    }
}

// ---------------------------------------------------------------------------
// CapabilitiesConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    /// User name to the capabilities they hold across the file plan.
    #[serde(default = "default_grants")]
    pub grants: BTreeMap<String, Vec<Capability>>,
}

fn default_grants() -> BTreeMap<String, Vec<Capability>> {
    let mut m = BTreeMap::new();
    m.insert("admin".to_string(), Capability::all().to_vec());
    m
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            grants: default_grants(),
        }
    }
}

// ---------------------------------------------------------------------------
// DispositionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispositionConfig {
    /// Properties whose changes recompute a pending disposition date.
    #[serde(default = "default_disposition_properties")]
    pub properties: Vec<String>,
}

fn default_disposition_properties() -> Vec<String> {
    [PROP_DATE_FILED, PROP_CUT_OFF_DATE, PROP_REVIEW_AS_OF]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for DispositionConfig {
    fn default() -> Self {
        Self {
            properties: default_disposition_properties(),
        }
    }
}

impl DispositionConfig {
    pub fn watched_properties(&self) -> Result<Vec<QName>> {
        self.properties.iter().map(|p| p.parse()).collect()
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub file_plan: FilePlanConfig,
    #[serde(default)]
    pub model_security: ModelSecurityConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
    #[serde(default)]
    pub disposition: DispositionConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self::new(default_file_plan_name())
    }
}

impl Config {
    pub fn new(file_plan_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            file_plan: FilePlanConfig {
                name: file_plan_name.into(),
            },
            model_security: ModelSecurityConfig::default(),
            events: EventsConfig::default(),
            capabilities: CapabilitiesConfig::default(),
            disposition: DispositionConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(RetentionError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Problems that would make the configuration fail to load into the
    /// engines (`Error`) or that are probably mistakes (`Warning`).
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.file_plan.name.trim().is_empty() {
            warnings.push(ConfigWarning::error("file_plan.name is empty".to_string()));
        }

        for (section, artifacts) in [
            ("protected_properties", &self.model_security.protected_properties),
            ("protected_aspects", &self.model_security.protected_aspects),
        ] {
            let mut seen = BTreeSet::new();
            for artifact in artifacts {
                if artifact.capabilities.is_empty() {
                    warnings.push(ConfigWarning::error(format!(
                        "'{}' in model_security.{} has no capabilities",
                        artifact.name, section
                    )));
                }
                if !seen.insert(&artifact.name) {
                    warnings.push(ConfigWarning::error(format!(
                        "'{}' is listed twice in model_security.{}",
                        artifact.name, section
                    )));
                }
            }
        }

        let types: BTreeSet<&str> = self.events.types.iter().map(|t| t.name.as_str()).collect();
        let mut names = BTreeSet::new();
        let mut labels = BTreeSet::new();
        for event in &self.events.events {
            if !types.contains(event.event_type.as_str()) {
                warnings.push(ConfigWarning::error(format!(
                    "event '{}' has unknown type '{}'",
                    event.name, event.event_type
                )));
            }
            if !names.insert(event.name.as_str()) {
                warnings.push(ConfigWarning::error(format!(
                    "duplicate event name '{}'",
                    event.name
                )));
            }
            if !labels.insert(event.display_label.as_str()) {
                warnings.push(ConfigWarning::error(format!(
                    "duplicate event label '{}'",
                    event.display_label
                )));
            }
        }

        for property in &self.disposition.properties {
            if QName::new(property.clone()).is_err() {
                warnings.push(ConfigWarning::error(format!(
                    "disposition property '{}' is not a qualified name",
                    property
                )));
            }
        }

        for (user, caps) in &self.capabilities.grants {
            if caps.is_empty() {
                warnings.push(ConfigWarning::warning(format!(
                    "user '{}' is listed in capabilities.grants without any capability",
                    user
                )));
            }
        }

        warnings
    }
}
