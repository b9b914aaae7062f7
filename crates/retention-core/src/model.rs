//! Content model: the qualified names of properties, aspects and association
//! types the engines read and write, plus the aspect that owns each property.

use crate::types::QName;

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

pub const PROP_NAME: QName = QName::from_static("cm:name");
pub const PROP_CREATED: QName = QName::from_static("cm:created");
pub const PROP_DESCRIPTION: QName = QName::from_static("cm:description");

pub const ASSOC_CONTAINS: QName = QName::from_static("cm:contains");

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

pub const ASPECT_RECORD: QName = QName::from_static("rma:record");
pub const PROP_DATE_FILED: QName = QName::from_static("rma:dateFiled");
pub const PROP_ORIGINATOR: QName = QName::from_static("rma:originator");

// ---------------------------------------------------------------------------
// Vital records
// ---------------------------------------------------------------------------

pub const ASPECT_VITAL_RECORD_DEFINITION: QName =
    QName::from_static("rma:vitalRecordDefinition");
pub const PROP_VITAL_RECORD_INDICATOR: QName = QName::from_static("rma:vitalRecordIndicator");
pub const PROP_REVIEW_PERIOD: QName = QName::from_static("rma:reviewPeriod");

pub const ASPECT_VITAL_RECORD: QName = QName::from_static("rma:vitalRecord");
pub const PROP_REVIEW_AS_OF: QName = QName::from_static("rma:reviewAsOf");

// ---------------------------------------------------------------------------
// Disposition
// ---------------------------------------------------------------------------

pub const ASPECT_DISPOSITION_LIFECYCLE: QName = QName::from_static("rma:dispositionLifecycle");
pub const ASPECT_SCHEDULED: QName = QName::from_static("rma:scheduled");

pub const ASPECT_CUT_OFF: QName = QName::from_static("rma:cutOff");
pub const PROP_CUT_OFF_DATE: QName = QName::from_static("rma:cutOffDate");

pub const ASPECT_TRANSFERRED: QName = QName::from_static("rma:transferred");
pub const PROP_TRANSFERRED_AT: QName = QName::from_static("rma:transferredAt");
pub const ASPECT_ACCESSIONED: QName = QName::from_static("rma:accessioned");
pub const PROP_ACCESSIONED_AT: QName = QName::from_static("rma:accessionedAt");
pub const ASPECT_DESTROYED: QName = QName::from_static("rma:destroyed");
pub const PROP_DESTROYED_AT: QName = QName::from_static("rma:destroyedAt");

// schedule node
pub const PROP_DISPOSITION_AUTHORITY: QName = QName::from_static("rma:dispositionAuthority");
pub const PROP_DISPOSITION_INSTRUCTIONS: QName =
    QName::from_static("rma:dispositionInstructions");
pub const PROP_RECORD_LEVEL_DISPOSITION: QName =
    QName::from_static("rma:recordLevelDisposition");

// action definition node
pub const PROP_DISPOSITION_ACTION_NAME: QName = QName::from_static("rma:dispositionActionName");
pub const PROP_DISPOSITION_DESCRIPTION: QName = QName::from_static("rma:dispositionDescription");
pub const PROP_DISPOSITION_PERIOD: QName = QName::from_static("rma:dispositionPeriod");
pub const PROP_DISPOSITION_PERIOD_PROPERTY: QName =
    QName::from_static("rma:dispositionPeriodProperty");
pub const PROP_DISPOSITION_EVENT: QName = QName::from_static("rma:dispositionEvent");
pub const PROP_DISPOSITION_EVENT_COMBINATION: QName =
    QName::from_static("rma:dispositionEventCombination");
pub const PROP_DISPOSITION_INDEX: QName = QName::from_static("rma:dispositionIndex");

// live action node
pub const PROP_DISPOSITION_ACTION_ID: QName = QName::from_static("rma:dispositionActionId");
pub const PROP_DISPOSITION_ACTION: QName = QName::from_static("rma:dispositionAction");
pub const PROP_DISPOSITION_AS_OF: QName = QName::from_static("rma:dispositionAsOf");
pub const PROP_DISPOSITION_ACTION_STARTED_AT: QName =
    QName::from_static("rma:dispositionActionStartedAt");
pub const PROP_DISPOSITION_ACTION_STARTED_BY: QName =
    QName::from_static("rma:dispositionActionStartedBy");
pub const PROP_DISPOSITION_ACTION_COMPLETED_AT: QName =
    QName::from_static("rma:dispositionActionCompletedAt");
pub const PROP_DISPOSITION_ACTION_COMPLETED_BY: QName =
    QName::from_static("rma:dispositionActionCompletedBy");

// event execution node
pub const PROP_EVENT_EXECUTION_NAME: QName = QName::from_static("rma:eventExecutionName");
pub const PROP_EVENT_EXECUTION_AUTOMATIC: QName =
    QName::from_static("rma:eventExecutionAutomatic");
pub const PROP_EVENT_EXECUTION_COMPLETE: QName =
    QName::from_static("rma:eventExecutionComplete");
pub const PROP_EVENT_EXECUTION_COMPLETED_AT: QName =
    QName::from_static("rma:eventExecutionCompletedAt");
pub const PROP_EVENT_EXECUTION_COMPLETED_BY: QName =
    QName::from_static("rma:eventExecutionCompletedBy");

pub const ASSOC_DISPOSITION_SCHEDULE: QName = QName::from_static("rma:dispositionSchedule");
pub const ASSOC_DISPOSITION_ACTION_DEFINITIONS: QName =
    QName::from_static("rma:dispositionActionDefinitions");
pub const ASSOC_NEXT_DISPOSITION_ACTION: QName =
    QName::from_static("rma:nextDispositionAction");
pub const ASSOC_DISPOSITION_ACTION_HISTORY: QName =
    QName::from_static("rma:dispositionActionHistory");
pub const ASSOC_EVENT_EXECUTIONS: QName = QName::from_static("rma:eventExecutions");

// ---------------------------------------------------------------------------
// Holds
// ---------------------------------------------------------------------------

pub const ASPECT_FROZEN: QName = QName::from_static("rma:frozen");
pub const PROP_FROZEN_AT: QName = QName::from_static("rma:frozenAt");
pub const PROP_FROZEN_BY: QName = QName::from_static("rma:frozenBy");

pub const PROP_HOLD_REASON: QName = QName::from_static("rma:holdReason");
pub const ASSOC_FROZEN_CONTENT: QName = QName::from_static("rma:frozenContent");
pub const ASSOC_HOLDS: QName = QName::from_static("rma:holds");

/// Name of the hold container created under every file plan.
pub const HOLD_CONTAINER_NAME: &str = "Holds";

// ---------------------------------------------------------------------------
// Property to aspect binding
// ---------------------------------------------------------------------------

/// The aspect a property belongs to, if any. Setting a bound property adds
/// its aspect; removing the aspect removes every bound property.
pub fn aspect_for_property(property: &QName) -> Option<QName> {
    let aspect = match property.as_str() {
        "rma:dateFiled" | "rma:originator" => ASPECT_RECORD,
        "rma:vitalRecordIndicator" | "rma:reviewPeriod" => ASPECT_VITAL_RECORD_DEFINITION,
        "rma:reviewAsOf" => ASPECT_VITAL_RECORD,
        "rma:cutOffDate" => ASPECT_CUT_OFF,
        "rma:frozenAt" | "rma:frozenBy" => ASPECT_FROZEN,
        "rma:transferredAt" => ASPECT_TRANSFERRED,
        "rma:accessionedAt" => ASPECT_ACCESSIONED,
        "rma:destroyedAt" => ASPECT_DESTROYED,
        _ => return None,
    };
    Some(aspect)
}

/// Properties owned by `aspect`.
pub fn properties_of_aspect(aspect: &QName) -> &'static [QName] {
    const RECORD: &[QName] = &[PROP_DATE_FILED, PROP_ORIGINATOR];
    const VITAL_DEFINITION: &[QName] = &[PROP_VITAL_RECORD_INDICATOR, PROP_REVIEW_PERIOD];
    const VITAL: &[QName] = &[PROP_REVIEW_AS_OF];
    const CUT_OFF: &[QName] = &[PROP_CUT_OFF_DATE];
    const FROZEN: &[QName] = &[PROP_FROZEN_AT, PROP_FROZEN_BY];
    const TRANSFERRED: &[QName] = &[PROP_TRANSFERRED_AT];
    const ACCESSIONED: &[QName] = &[PROP_ACCESSIONED_AT];
    const DESTROYED: &[QName] = &[PROP_DESTROYED_AT];

    match aspect.as_str() {
        "rma:record" => RECORD,
        "rma:vitalRecordDefinition" => VITAL_DEFINITION,
        "rma:vitalRecord" => VITAL,
        "rma:cutOff" => CUT_OFF,
        "rma:frozen" => FROZEN,
        "rma:transferred" => TRANSFERRED,
        "rma:accessioned" => ACCESSIONED,
        "rma:destroyed" => DESTROYED,
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_is_consistent_both_ways() {
        for aspect in [
            ASPECT_RECORD,
            ASPECT_VITAL_RECORD_DEFINITION,
            ASPECT_VITAL_RECORD,
            ASPECT_CUT_OFF,
            ASPECT_FROZEN,
            ASPECT_TRANSFERRED,
            ASPECT_ACCESSIONED,
            ASPECT_DESTROYED,
        ] {
            let props = properties_of_aspect(&aspect);
            assert!(!props.is_empty(), "{aspect} owns no properties");
            for prop in props {
                assert_eq!(aspect_for_property(prop).as_ref(), Some(&aspect));
            }
        }
    }

    #[test]
    fn marker_aspects_and_free_properties() {
        assert!(properties_of_aspect(&ASPECT_DISPOSITION_LIFECYCLE).is_empty());
        assert!(aspect_for_property(&PROP_NAME).is_none());
        assert!(aspect_for_property(&PROP_DISPOSITION_AS_OF).is_none());
    }

    #[test]
    fn constants_are_valid_qnames() {
        for q in [PROP_DISPOSITION_ACTION_COMPLETED_AT, ASSOC_FROZEN_CONTENT, PROP_CREATED] {
            QName::new(q.as_str()).unwrap();
        }
    }
}
