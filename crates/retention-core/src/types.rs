use crate::error::{Result, RetentionError};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// QName
// ---------------------------------------------------------------------------

/// A qualified model name such as `rma:cutOffDate`.
///
/// Model constants are built with [`QName::from_static`] so they can live in
/// `const` items; anything arriving from config or the command line goes
/// through [`QName::new`], which validates the `prefix:localName` shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QName(Cow<'static, str>);

static QNAME_RE: OnceLock<Regex> = OnceLock::new();
static INVALID_LOCAL_CHARS_RE: OnceLock<Regex> = OnceLock::new();

fn qname_re() -> &'static Regex {
    QNAME_RE.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9]*:[A-Za-z_][A-Za-z0-9_.\-]*$").expect("static regex")
    })
}

fn invalid_local_chars_re() -> &'static Regex {
    INVALID_LOCAL_CHARS_RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("static regex"))
}

impl QName {
    pub const fn from_static(name: &'static str) -> Self {
        QName(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.len() > 255 || !qname_re().is_match(&name) {
            return Err(RetentionError::InvalidQName(name));
        }
        Ok(QName(Cow::Owned(name)))
    }

    /// Build a name in the given namespace prefix from an arbitrary display
    /// name, sanitising the local part.
    pub fn valid_from(prefix: &str, display_name: &str) -> Result<Self> {
        Self::new(format!("{prefix}:{}", create_valid_local_name(display_name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn prefix(&self) -> &str {
        self.0.split_once(':').map(|(p, _)| p).unwrap_or("")
    }

    pub fn local_name(&self) -> &str {
        self.0.split_once(':').map(|(_, l)| l).unwrap_or(&self.0)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for QName {
    type Err = RetentionError;

    fn from_str(s: &str) -> Result<Self> {
        QName::new(s)
    }
}

impl TryFrom<String> for QName {
    type Error = RetentionError;

    fn try_from(value: String) -> Result<Self> {
        QName::new(value)
    }
}

impl From<QName> for String {
    fn from(value: QName) -> Self {
        value.0.into_owned()
    }
}

/// Turn an arbitrary display name into a valid local name: characters outside
/// `[A-Za-z0-9_.-]` become `_`, a leading digit/punctuation gets a `_`
/// prefix, and the result is capped at 100 characters.
pub fn create_valid_local_name(name: &str) -> String {
    let mut local = invalid_local_chars_re().replace_all(name.trim(), "_").into_owned();
    let starts_ok = local
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !starts_ok {
        local.insert(0, '_');
    }
    local.chars().take(100).collect()
}

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn generate() -> Self {
        NodeId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    FilePlan,
    RecordCategory,
    RecordFolder,
    Record,
    HoldContainer,
    Hold,
    DispositionSchedule,
    DispositionActionDefinition,
    DispositionAction,
    EventExecution,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::FilePlan => "file_plan",
            NodeKind::RecordCategory => "record_category",
            NodeKind::RecordFolder => "record_folder",
            NodeKind::Record => "record",
            NodeKind::HoldContainer => "hold_container",
            NodeKind::Hold => "hold",
            NodeKind::DispositionSchedule => "disposition_schedule",
            NodeKind::DispositionActionDefinition => "disposition_action_definition",
            NodeKind::DispositionAction => "disposition_action",
            NodeKind::EventExecution => "event_execution",
        }
    }

    /// Nodes that make up the visible file plan hierarchy.
    pub fn is_file_plan_component(self) -> bool {
        matches!(
            self,
            NodeKind::FilePlan
                | NodeKind::RecordCategory
                | NodeKind::RecordFolder
                | NodeKind::Record
                | NodeKind::HoldContainer
                | NodeKind::Hold
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PropertyValue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Text(String),
    Bool(bool),
    Int(i64),
    Date(DateTime<Utc>),
    TextList(Vec<String>),
}

pub type Properties = BTreeMap<QName, PropertyValue>;

/// A batch of property edits: `None` clears the property.
pub type PropertyChanges = BTreeMap<QName, Option<PropertyValue>>;

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            PropertyValue::TextList(v) => Some(v),
            _ => None,
        }
    }

    /// Interpret a raw command-line value: RFC 3339 timestamps and
    /// `YYYY-MM-DD` dates become dates, `true`/`false` booleans, integers
    /// ints, anything else text.
    pub fn infer(raw: &str) -> PropertyValue {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return PropertyValue::Date(dt.with_timezone(&Utc));
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return PropertyValue::Date(dt.and_utc());
            }
        }
        match raw {
            "true" => return PropertyValue::Bool(true),
            "false" => return PropertyValue::Bool(false),
            _ => {}
        }
        if let Ok(i) = raw.parse::<i64>() {
            return PropertyValue::Int(i);
        }
        PropertyValue::Text(raw.to_string())
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(s) => f.write_str(s),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Int(i) => write!(f, "{i}"),
            PropertyValue::Date(d) => write!(f, "{}", d.to_rfc3339()),
            PropertyValue::TextList(v) => f.write_str(&v.join(",")),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::Date(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        PropertyValue::TextList(value)
    }
}

// ---------------------------------------------------------------------------
// AccessStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    Allowed,
    Denied,
    Undetermined,
}

impl AccessStatus {
    pub fn is_denied(self) -> bool {
        matches!(self, AccessStatus::Denied)
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessStatus::Allowed => "allowed",
            AccessStatus::Denied => "denied",
            AccessStatus::Undetermined => "undetermined",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// The closed catalogue of records management capabilities. The variant
/// names double as the stable identifiers used in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    ViewRecords,
    FileRecords,
    EditRecordMetadata,
    EditDeclaredRecordMetadata,
    ApproveRecordsScheduledForCutoff,
    AddModifyEventDates,
    ManuallyChangeDispositionDates,
    UpdateVitalRecordCycleInformation,
    CycleVitalRecords,
    ExtendRetentionPeriodOrFreeze,
    CreateHold,
    AddToHold,
    RemoveFromHold,
    DeleteHold,
    CreateModifyDestroyEvents,
    CreateModifyDestroyFileplanMetadata,
}

impl Capability {
    pub fn all() -> &'static [Capability] {
        &[
            Capability::ViewRecords,
            Capability::FileRecords,
            Capability::EditRecordMetadata,
            Capability::EditDeclaredRecordMetadata,
            Capability::ApproveRecordsScheduledForCutoff,
            Capability::AddModifyEventDates,
            Capability::ManuallyChangeDispositionDates,
            Capability::UpdateVitalRecordCycleInformation,
            Capability::CycleVitalRecords,
            Capability::ExtendRetentionPeriodOrFreeze,
            Capability::CreateHold,
            Capability::AddToHold,
            Capability::RemoveFromHold,
            Capability::DeleteHold,
            Capability::CreateModifyDestroyEvents,
            Capability::CreateModifyDestroyFileplanMetadata,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ViewRecords => "ViewRecords",
            Capability::FileRecords => "FileRecords",
            Capability::EditRecordMetadata => "EditRecordMetadata",
            Capability::EditDeclaredRecordMetadata => "EditDeclaredRecordMetadata",
            Capability::ApproveRecordsScheduledForCutoff => "ApproveRecordsScheduledForCutoff",
            Capability::AddModifyEventDates => "AddModifyEventDates",
            Capability::ManuallyChangeDispositionDates => "ManuallyChangeDispositionDates",
            Capability::UpdateVitalRecordCycleInformation => "UpdateVitalRecordCycleInformation",
            Capability::CycleVitalRecords => "CycleVitalRecords",
            Capability::ExtendRetentionPeriodOrFreeze => "ExtendRetentionPeriodOrFreeze",
            Capability::CreateHold => "CreateHold",
            Capability::AddToHold => "AddToHold",
            Capability::RemoveFromHold => "RemoveFromHold",
            Capability::DeleteHold => "DeleteHold",
            Capability::CreateModifyDestroyEvents => "CreateModifyDestroyEvents",
            Capability::CreateModifyDestroyFileplanMetadata => {
                "CreateModifyDestroyFileplanMetadata"
            }
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = RetentionError;

    fn from_str(s: &str) -> Result<Self> {
        Capability::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| RetentionError::InvalidCapability(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
