use crate::types::NodeKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("not initialized: run 'rmctl init'")]
    NotInitialized,

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("'{name}' already exists in '{parent}'")]
    NameExists { parent: String, name: String },

    #[error("file plan already exists: {0}")]
    FilePlanExists(String),

    #[error("node '{node}' is a {actual}, expected {expected}")]
    UnexpectedNodeKind {
        node: String,
        expected: &'static str,
        actual: NodeKind,
    },

    #[error("invalid qualified name '{0}': expected 'prefix:localName'")]
    InvalidQName(String),

    #[error("invalid period '{0}'")]
    InvalidPeriod(String),

    #[error("invalid capability '{0}'")]
    InvalidCapability(String),

    #[error("unknown disposition step '{0}'")]
    UnknownDispositionStep(String),

    #[error("property '{property}' on '{node}' is not a {expected}")]
    PropertyType {
        node: String,
        property: String,
        expected: &'static str,
    },

    // -- disposition --------------------------------------------------------
    #[error("record category '{0}' already has a retention schedule")]
    ScheduleExists(String),

    #[error("no retention schedule found for '{0}'")]
    ScheduleNotFound(String),

    #[error("retention schedule '{0}' already controls disposable items")]
    DisposableItemsPresent(String),

    #[error("invalid disposition action definition: {0}")]
    InvalidDefinition(String),

    #[error("no pending disposition action on '{0}'")]
    NoPendingAction(String),

    #[error("'{0}' is not a disposable item of its retention schedule")]
    NotDisposableItem(String),

    #[error("'{0}' is already cut off")]
    AlreadyCutOff(String),

    #[error("'{0}' is held or contains held records")]
    ItemFrozen(String),

    #[error("event '{event}' is not a trigger of the pending disposition action on '{node}'")]
    EventNotApplicable { node: String, event: String },

    #[error("illegal change to '{property}' on '{node}': {reason}")]
    IllegalStateMutation {
        node: String,
        property: String,
        reason: String,
    },

    // -- holds --------------------------------------------------------------
    #[error("'{0}' is not a hold")]
    NotAHold(String),

    #[error("hold already exists: {0}")]
    HoldExists(String),

    #[error("invalid hold: {0}")]
    InvalidHold(String),

    #[error("'{0}' cannot be held: only records and record folders can be added to a hold")]
    InvalidHoldItem(String),

    // -- security -----------------------------------------------------------
    #[error("access denied: capability '{capability}' is required on '{node}'")]
    AccessDenied { capability: String, node: String },

    #[error("access denied: protected property '{property}' cannot be edited on '{node}'")]
    ProtectedPropertyDenied { property: String, node: String },

    #[error("access denied: protected aspect '{aspect}' cannot be changed on '{node}'")]
    ProtectedAspectDenied { aspect: String, node: String },

    #[error("protected artifact already registered: {0}")]
    ArtifactExists(String),

    #[error("invalid protected artifact '{0}': at least one capability is required")]
    InvalidArtifact(String),

    // -- events -------------------------------------------------------------
    #[error("event type already registered: {0}")]
    EventTypeExists(String),

    #[error("event type not found: {0}")]
    EventTypeNotFound(String),

    #[error("event already exists: {0}")]
    EventExists(String),

    #[error("event not found: {0}")]
    EventNotFound(String),

    #[error("event '{0}' is referenced by a retention schedule")]
    EventInUse(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    // -- store --------------------------------------------------------------
    #[error("transaction rolled back")]
    TransactionRolledBack,

    #[error("no transaction in progress")]
    NoTransaction,

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, RetentionError>;
