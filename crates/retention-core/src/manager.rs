//! The records manager: one object composing the store with every engine.
//!
//! Callers outside the crate go through [`RecordsManager`]. It runs each
//! command in a single store transaction, routes property writes through the
//! change notifier, enforces model security on user edits and gates hold
//! management on capabilities.

use crate::behaviour::{ChangeNotifier, PropertyUpdate};
use crate::capability::{CapabilityService, StaticCapabilityService};
use crate::config::Config;
use crate::context::OperationContext;
use crate::disposition::{
    self, ActionDefinitionSpec, DispositionAction, DispositionActionDefinition,
    DispositionPropertyListener, DispositionSchedule, ExecutionOutcome, ScheduleSpec,
};
use crate::error::{Result, RetentionError};
use crate::event::{EventRegistry, EventType, RecordsManagementEvent};
use crate::hold;
use crate::model::{self, ASSOC_CONTAINS, PROP_CREATED, PROP_DATE_FILED};
use crate::period::Period;
use crate::security::ModelSecurityService;
use crate::store::{in_transaction, NodeStore};
use crate::types::{
    AccessStatus, Capability, NodeId, NodeKind, Properties, PropertyChanges, PropertyValue, QName,
};
use crate::vital::{self, VitalRecordDefinition, VitalRecordDefinitionListener};
use chrono::{DateTime, Utc};
use tracing::info;

pub struct RecordsManager<S: NodeStore> {
    store: S,
    events: EventRegistry,
    security: ModelSecurityService,
    capabilities: Box<dyn CapabilityService>,
    notifier: ChangeNotifier,
}

impl<S: NodeStore> RecordsManager<S> {
    /// Compose a manager. The disposition listener watches
    /// `disposition_properties`; the vital record listener is always on.
    pub fn new(
        store: S,
        events: EventRegistry,
        security: ModelSecurityService,
        capabilities: Box<dyn CapabilityService>,
        disposition_properties: Vec<QName>,
    ) -> Self {
        let mut notifier = ChangeNotifier::new();
        notifier.register(Box::new(DispositionPropertyListener::new(disposition_properties)));
        notifier.register(Box::new(VitalRecordDefinitionListener));
        RecordsManager {
            store,
            events,
            security,
            capabilities,
            notifier,
        }
    }

    pub fn from_config(store: S, config: &Config) -> Result<Self> {
        let events = EventRegistry::from_config(&config.events.types, &config.events.events)?;
        let security = ModelSecurityService::from_config(
            config.model_security.enabled,
            &config.model_security.protected_properties,
            &config.model_security.protected_aspects,
        )?;
        let capabilities = StaticCapabilityService::from_grants(&config.capabilities.grants);
        Ok(Self::new(
            store,
            events,
            security,
            Box::new(capabilities),
            config.disposition.watched_properties()?,
        ))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    pub fn security(&self) -> &ModelSecurityService {
        &self.security
    }

    pub fn security_mut(&mut self) -> &mut ModelSecurityService {
        &mut self.security
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    // -----------------------------------------------------------------------
    // File plan structure
    // -----------------------------------------------------------------------

    pub fn file_plan(&self) -> Option<NodeId> {
        self.store.nodes_of_kind(NodeKind::FilePlan).into_iter().next()
    }

    fn require_file_plan(&self) -> Result<NodeId> {
        self.file_plan()
            .ok_or_else(|| RetentionError::NodeNotFound("file plan".to_string()))
    }

    /// Resolve a node id, or a `/`-separated name path from the file plan
    /// root (`Finance/Invoices/2024`).
    pub fn resolve(&self, reference: &str) -> Option<NodeId> {
        let id = NodeId::new(reference);
        if self.store.exists(&id) {
            return Some(id);
        }
        let mut current = self.file_plan()?;
        for segment in reference.split('/').filter(|s| !s.is_empty()) {
            current = self.store.child_by_name(&current, segment)?;
        }
        Some(current)
    }

    /// A `/`-separated name path from the file plan root.
    pub fn path_of(&self, node: &NodeId) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = node.clone();
        while let Some(assoc) = self.store.primary_parent(&current) {
            segments.push(self.store.name(&current)?);
            current = assoc.parent;
        }
        if self.store.kind(&current) != Some(NodeKind::FilePlan) {
            return None;
        }
        segments.reverse();
        Some(segments.join("/"))
    }

    pub fn create_file_plan(&mut self, ctx: &mut OperationContext, name: &str) -> Result<NodeId> {
        if let Some(existing) = self.file_plan() {
            return Err(RetentionError::FilePlanExists(
                self.store.name(&existing).unwrap_or_default(),
            ));
        }
        let now = ctx.now();
        let plan = in_transaction(&mut self.store, |store| {
            let plan = store.create_node(None, &ASSOC_CONTAINS, NodeKind::FilePlan, name, created_at(now))?;
            hold::ensure_hold_container(store, &plan)?;
            Ok(plan)
        })?;
        info!(file_plan = %plan, name, "file plan created");
        Ok(plan)
    }

    pub fn create_category(
        &mut self,
        ctx: &mut OperationContext,
        parent: &NodeId,
        name: &str,
    ) -> Result<NodeId> {
        self.store
            .require_kind(parent, &[NodeKind::FilePlan, NodeKind::RecordCategory])?;
        self.require_unique_name(parent, name)?;
        let now = ctx.now();
        in_transaction(&mut self.store, |store| {
            let category = store.create_node(
                Some(parent),
                &ASSOC_CONTAINS,
                NodeKind::RecordCategory,
                name,
                created_at(now),
            )?;
            vital::setup_vital_record_definition(store, &category)?;
            Ok(category)
        })
    }

    pub fn create_folder(
        &mut self,
        ctx: &mut OperationContext,
        category: &NodeId,
        name: &str,
    ) -> Result<NodeId> {
        self.store.require_kind(category, &[NodeKind::RecordCategory])?;
        self.require_unique_name(category, name)?;
        let events = &self.events;
        in_transaction(&mut self.store, |store| {
            let folder = store.create_node(
                Some(category),
                &ASSOC_CONTAINS,
                NodeKind::RecordFolder,
                name,
                created_at(ctx.now()),
            )?;
            vital::setup_vital_record_definition(store, &folder)?;
            vital::initialise_vital_record(ctx, store, &folder)?;
            disposition::initialise_disposition_lifecycle(ctx, store, events, &folder)?;
            Ok(folder)
        })
    }

    /// File a new record in `folder`. `rma:dateFiled` defaults to now.
    /// Protected properties are checked as for any edit, so only those
    /// flagged "always allow new" pass for users lacking the capability.
    pub fn file_record(
        &mut self,
        ctx: &mut OperationContext,
        folder: &NodeId,
        name: &str,
        properties: Properties,
    ) -> Result<NodeId> {
        self.store.require_kind(folder, &[NodeKind::RecordFolder])?;
        self.require_unique_name(folder, name)?;
        let RecordsManager {
            store,
            events,
            security,
            capabilities,
            notifier,
        } = self;
        in_transaction(store, |store| {
            let record = store.create_node(
                Some(folder),
                &ASSOC_CONTAINS,
                NodeKind::Record,
                name,
                created_at(ctx.now()),
            )?;
            let mut changes: PropertyChanges =
                properties.into_iter().map(|(k, v)| (k, Some(v))).collect();
            changes
                .entry(PROP_DATE_FILED)
                .or_insert_with(|| Some(PropertyValue::Date(ctx.now())));
            for property in changes.keys() {
                security.check_property(ctx, &*store, &**capabilities, &record, property)?;
            }
            notifier.set_properties(ctx, &mut *store, &record, changes)?;
            vital::initialise_vital_record(ctx, &mut *store, &record)?;
            disposition::initialise_disposition_lifecycle(ctx, &mut *store, events, &record)?;
            hold::refresh_frozen(ctx, &mut *store, &record)?;
            info!(record = %record, folder = %folder, "record filed");
            Ok(record)
        })
    }

    fn require_unique_name(&self, parent: &NodeId, name: &str) -> Result<()> {
        if self.store.child_by_name(parent, name).is_some() {
            return Err(RetentionError::NameExists {
                parent: parent.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Property and aspect edits
    // -----------------------------------------------------------------------

    /// Apply user property edits. Every protected property whose value
    /// actually changes must be editable by the caller.
    pub fn update_properties(
        &mut self,
        ctx: &mut OperationContext,
        node: &NodeId,
        changes: PropertyChanges,
    ) -> Result<PropertyUpdate> {
        self.store.require(node)?;
        for (property, value) in &changes {
            if self.store.property(node, property) != value.as_ref() {
                self.security.check_property(
                    ctx,
                    &self.store,
                    self.capabilities.as_ref(),
                    node,
                    property,
                )?;
            }
        }
        self.notifier.set_properties(ctx, &mut self.store, node, changes)
    }

    pub fn set_property(
        &mut self,
        ctx: &mut OperationContext,
        node: &NodeId,
        property: QName,
        value: Option<PropertyValue>,
    ) -> Result<PropertyUpdate> {
        let mut changes = PropertyChanges::new();
        changes.insert(property, value);
        self.update_properties(ctx, node, changes)
    }

    pub fn add_aspect(
        &mut self,
        ctx: &mut OperationContext,
        node: &NodeId,
        aspect: &QName,
        properties: Properties,
    ) -> Result<()> {
        self.store.require(node)?;
        self.security
            .check_aspect(ctx, &self.store, self.capabilities.as_ref(), node, aspect)?;
        for property in properties.keys() {
            self.security
                .check_property(ctx, &self.store, self.capabilities.as_ref(), node, property)?;
        }
        let notifier = &self.notifier;
        in_transaction(&mut self.store, |store| {
            store.add_aspect(node, aspect, Properties::new())?;
            if !properties.is_empty() {
                let changes = properties.into_iter().map(|(k, v)| (k, Some(v))).collect();
                notifier.set_properties(ctx, &mut *store, node, changes)?;
            }
            Ok(())
        })
    }

    /// Remove an aspect. Its properties are cleared through the notifier
    /// first, so clearing a disposition anchor is refused as usual.
    pub fn remove_aspect(
        &mut self,
        ctx: &mut OperationContext,
        node: &NodeId,
        aspect: &QName,
    ) -> Result<()> {
        self.store.require(node)?;
        self.security
            .check_aspect(ctx, &self.store, self.capabilities.as_ref(), node, aspect)?;
        let bound: Vec<QName> = model::properties_of_aspect(aspect)
            .iter()
            .filter(|p| self.store.property(node, p).is_some())
            .cloned()
            .collect();
        for property in &bound {
            self.security
                .check_property(ctx, &self.store, self.capabilities.as_ref(), node, property)?;
        }
        let notifier = &self.notifier;
        in_transaction(&mut self.store, |store| {
            if !bound.is_empty() {
                let changes = bound.into_iter().map(|p| (p, None)).collect();
                notifier.set_properties(ctx, &mut *store, node, changes)?;
            }
            store.remove_aspect(node, aspect)
        })
    }

    pub fn can_edit_protected_property(&self, ctx: &OperationContext, node: &NodeId, property: &QName) -> bool {
        self.security
            .can_edit_protected_property(ctx, &self.store, self.capabilities.as_ref(), node, property)
    }

    pub fn can_edit_protected_aspect(&self, ctx: &OperationContext, node: &NodeId, aspect: &QName) -> bool {
        self.security
            .can_edit_protected_aspect(ctx, &self.store, self.capabilities.as_ref(), node, aspect)
    }

    pub fn evaluate_access(&self, ctx: &OperationContext, node: &NodeId, capabilities: &[Capability]) -> AccessStatus {
        self.capabilities.evaluate_access(ctx.user(), node, capabilities)
    }

    fn require_capability(&self, ctx: &OperationContext, node: &NodeId, capability: Capability) -> Result<()> {
        if ctx.is_system() || !self.evaluate_access(ctx, node, &[capability]).is_denied() {
            return Ok(());
        }
        Err(RetentionError::AccessDenied {
            capability: capability.to_string(),
            node: node.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Schedules
    // -----------------------------------------------------------------------

    pub fn create_disposition_schedule(
        &mut self,
        category: &NodeId,
        spec: ScheduleSpec,
    ) -> Result<DispositionSchedule> {
        in_transaction(&mut self.store, |store| {
            disposition::create_disposition_schedule(store, category, spec)
        })
    }

    pub fn add_disposition_action_definition(
        &mut self,
        ctx: &mut OperationContext,
        category: &NodeId,
        spec: ActionDefinitionSpec,
    ) -> Result<DispositionActionDefinition> {
        let events = &self.events;
        in_transaction(&mut self.store, |store| {
            disposition::add_disposition_action_definition(ctx, store, events, category, spec)
        })
    }

    pub fn remove_disposition_action_definition(
        &mut self,
        category: &NodeId,
        definition: &NodeId,
    ) -> Result<()> {
        in_transaction(&mut self.store, |store| {
            disposition::remove_disposition_action_definition(store, category, definition)
        })
    }

    pub fn update_disposition_action_definition(
        &mut self,
        ctx: &mut OperationContext,
        category: &NodeId,
        definition: &NodeId,
        spec: ActionDefinitionSpec,
    ) -> Result<DispositionActionDefinition> {
        let events = &self.events;
        in_transaction(&mut self.store, |store| {
            disposition::update_disposition_action_definition(
                ctx, store, events, category, definition, spec,
            )
        })
    }

    pub fn get_disposition_schedule(&self, node: &NodeId) -> Option<DispositionSchedule> {
        disposition::get_disposition_schedule(&self.store, node)
    }

    // -----------------------------------------------------------------------
    // Disposition
    // -----------------------------------------------------------------------

    pub fn get_next_disposition_action(&self, node: &NodeId) -> Option<DispositionAction> {
        disposition::get_next_disposition_action(&self.store, node)
    }

    pub fn get_disposition_action_definition(&self, node: &NodeId) -> Option<DispositionActionDefinition> {
        disposition::get_disposition_action_definition(&self.store, node)
    }

    pub fn get_completed_disposition_actions(&self, node: &NodeId) -> Vec<DispositionAction> {
        disposition::get_completed_disposition_actions(&self.store, node)
    }

    pub fn is_next_disposition_action_eligible(&self, ctx: &OperationContext, node: &NodeId) -> bool {
        disposition::is_next_disposition_action_eligible(&self.store, node, ctx.now())
    }

    pub fn refresh_disposition_action(
        &mut self,
        ctx: &mut OperationContext,
        node: &NodeId,
    ) -> Result<Option<DispositionAction>> {
        let events = &self.events;
        in_transaction(&mut self.store, |store| {
            disposition::refresh_disposition_action(ctx, store, events, node)
        })
    }

    pub fn is_disposable_item_cutoff(&self, node: &NodeId) -> bool {
        disposition::is_disposable_item_cutoff(&self.store, node)
    }

    /// Cut off `node` ahead of its schedule. Needs the capability to approve
    /// records scheduled for cutoff.
    pub fn cutoff_disposable_item(
        &mut self,
        ctx: &mut OperationContext,
        node: &NodeId,
    ) -> Result<Option<DispositionAction>> {
        self.require_capability(ctx, node, Capability::ApproveRecordsScheduledForCutoff)?;
        let events = &self.events;
        in_transaction(&mut self.store, |store| {
            disposition::cutoff_disposable_item(ctx, store, events, node)
        })
    }

    pub fn complete_event(
        &mut self,
        ctx: &mut OperationContext,
        node: &NodeId,
        event: &str,
    ) -> Result<DispositionAction> {
        in_transaction(&mut self.store, |store| {
            disposition::complete_event(ctx, store, node, event)
        })
    }

    pub fn undo_event(&mut self, node: &NodeId, event: &str) -> Result<DispositionAction> {
        in_transaction(&mut self.store, |store| {
            disposition::undo_event(store, node, event)
        })
    }

    pub fn execute_next_disposition_action(
        &mut self,
        ctx: &mut OperationContext,
        node: &NodeId,
    ) -> Result<ExecutionOutcome> {
        let events = &self.events;
        in_transaction(&mut self.store, |store| {
            disposition::execute_next_disposition_action(ctx, store, events, node)
        })
    }

    // -----------------------------------------------------------------------
    // Holds
    // -----------------------------------------------------------------------

    pub fn create_hold(
        &mut self,
        ctx: &mut OperationContext,
        name: &str,
        reason: &str,
        description: Option<&str>,
    ) -> Result<NodeId> {
        let plan = self.require_file_plan()?;
        self.require_capability(ctx, &plan, Capability::CreateHold)?;
        in_transaction(&mut self.store, |store| {
            hold::create_hold(store, &plan, name, reason, description)
        })
    }

    pub fn delete_hold(&mut self, ctx: &mut OperationContext, hold: &NodeId) -> Result<()> {
        self.require_capability(ctx, hold, Capability::DeleteHold)?;
        in_transaction(&mut self.store, |store| hold::delete_hold(ctx, store, hold))
    }

    pub fn get_holds(&self) -> Vec<NodeId> {
        match self.file_plan() {
            Some(plan) => hold::get_holds_in_file_plan(&self.store, &plan),
            None => Vec::new(),
        }
    }

    pub fn get_hold(&self, name: &str) -> Option<NodeId> {
        hold::get_hold(&self.store, &self.file_plan()?, name)
    }

    pub fn get_holds_for_item(&self, node: &NodeId) -> Vec<NodeId> {
        hold::get_holds_for_item(&self.store, node)
    }

    /// Holds that freeze `node`, or with `included` unset, the file plan's
    /// other holds.
    pub fn held_by(&self, node: &NodeId, included: bool) -> Vec<NodeId> {
        match self.file_plan() {
            Some(plan) => hold::held_by(&self.store, &plan, node, included),
            None => Vec::new(),
        }
    }

    pub fn get_hold_reason(&self, hold: &NodeId) -> Result<Option<String>> {
        hold::get_hold_reason(&self.store, hold)
    }

    pub fn set_hold_reason(&mut self, ctx: &mut OperationContext, hold: &NodeId, reason: &str) -> Result<()> {
        self.require_capability(ctx, hold, Capability::CreateHold)?;
        in_transaction(&mut self.store, |store| hold::set_hold_reason(store, hold, reason))
    }

    pub fn get_held(&self, hold: &NodeId) -> Result<Vec<NodeId>> {
        hold::get_held(&self.store, hold)
    }

    pub fn is_frozen(&self, node: &NodeId) -> bool {
        hold::is_frozen(&self.store, node)
    }

    pub fn add_to_hold(&mut self, ctx: &mut OperationContext, hold: &NodeId, node: &NodeId) -> Result<()> {
        self.add_to_holds(ctx, std::slice::from_ref(hold), node)
    }

    pub fn add_to_holds(&mut self, ctx: &mut OperationContext, holds: &[NodeId], node: &NodeId) -> Result<()> {
        for hold in holds {
            self.require_capability(ctx, hold, Capability::AddToHold)?;
        }
        in_transaction(&mut self.store, |store| hold::add_to_holds(ctx, store, holds, node))
    }

    pub fn remove_from_hold(&mut self, ctx: &mut OperationContext, hold: &NodeId, node: &NodeId) -> Result<()> {
        self.remove_from_holds(ctx, std::slice::from_ref(hold), node)
    }

    pub fn remove_from_holds(
        &mut self,
        ctx: &mut OperationContext,
        holds: &[NodeId],
        node: &NodeId,
    ) -> Result<()> {
        for hold in holds {
            self.require_capability(ctx, hold, Capability::RemoveFromHold)?;
        }
        in_transaction(&mut self.store, |store| {
            hold::remove_from_holds(ctx, store, holds, node)
        })
    }

    // -----------------------------------------------------------------------
    // Vital records
    // -----------------------------------------------------------------------

    pub fn get_vital_record_definition(&self, node: &NodeId) -> Result<Option<VitalRecordDefinition>> {
        vital::get_vital_record_definition(&self.store, node)
    }

    pub fn is_vital_record(&self, node: &NodeId) -> bool {
        vital::is_vital_record(&self.store, node)
    }

    /// Edit a category's or folder's definition as a user edit; records
    /// directly inside follow through the vital record listener.
    pub fn set_vital_record_definition(
        &mut self,
        ctx: &mut OperationContext,
        node: &NodeId,
        enabled: bool,
        review_period: Period,
    ) -> Result<VitalRecordDefinition> {
        self.store
            .require_kind(node, &[NodeKind::RecordCategory, NodeKind::RecordFolder])?;
        let mut changes = PropertyChanges::new();
        changes.insert(model::PROP_VITAL_RECORD_INDICATOR, Some(enabled.into()));
        changes.insert(
            model::PROP_REVIEW_PERIOD,
            Some(PropertyValue::Text(review_period.to_string())),
        );
        self.update_properties(ctx, node, changes)?;
        Ok(VitalRecordDefinition::new(enabled, review_period))
    }

    pub fn review_vital_record(&mut self, ctx: &mut OperationContext, node: &NodeId) -> Result<DateTime<Utc>> {
        self.require_capability(ctx, node, Capability::CycleVitalRecords)?;
        in_transaction(&mut self.store, |store| vital::review_vital_record(ctx, store, node))
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn get_event_types(&self) -> Vec<&EventType> {
        self.events.get_event_types()
    }

    pub fn get_events(&self) -> Vec<&RecordsManagementEvent> {
        self.events.get_events()
    }

    pub fn get_event(&self, name: &str) -> Option<&RecordsManagementEvent> {
        self.events.get_event(name)
    }

    pub fn exists_event(&self, name: &str) -> bool {
        self.events.exists_event(name)
    }

    pub fn add_event(&mut self, event_type: &str, name: &str, display_label: &str) -> Result<RecordsManagementEvent> {
        self.events.add_event(event_type, name, display_label)
    }

    pub fn edit_event(&mut self, name: &str, display_label: &str, event_type: &str) -> Result<RecordsManagementEvent> {
        self.events.edit_event(name, display_label, event_type)
    }

    /// Remove an event no disposition definition triggers on.
    pub fn remove_event(&mut self, name: &str) -> Result<RecordsManagementEvent> {
        if disposition::events_in_use(&self.store).contains(name) {
            return Err(RetentionError::EventInUse(name.to_string()));
        }
        self.events.remove_event(name)
    }
}

fn created_at(now: DateTime<Utc>) -> Properties {
    let mut props = Properties::new();
    props.insert(PROP_CREATED, PropertyValue::Date(now));
    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::Capability;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn manager() -> RecordsManager<InMemoryStore> {
        let mut config = Config::new("plan");
        config
            .capabilities
            .grants
            .insert("clerk".to_string(), vec![Capability::ViewRecords]);
        RecordsManager::from_config(InMemoryStore::new(), &config).unwrap()
    }

    fn plan_with_folder(m: &mut RecordsManager<InMemoryStore>, ctx: &mut OperationContext) -> (NodeId, NodeId) {
        let plan = m.create_file_plan(ctx, "plan").unwrap();
        let category = m.create_category(ctx, &plan, "Finance").unwrap();
        let folder = m.create_folder(ctx, &category, "Invoices").unwrap();
        (category, folder)
    }

    #[test]
    fn resolves_paths_and_ids() {
        let mut m = manager();
        let mut ctx = OperationContext::new("admin");
        let (category, folder) = plan_with_folder(&mut m, &mut ctx);
        assert_eq!(m.resolve("Finance"), Some(category.clone()));
        assert_eq!(m.resolve("/Finance/Invoices"), Some(folder.clone()));
        assert_eq!(m.resolve(folder.as_str()), Some(folder.clone()));
        assert_eq!(m.resolve("Finance/Missing"), None);
        assert_eq!(m.path_of(&folder).as_deref(), Some("Finance/Invoices"));
    }

    #[test]
    fn structure_rules() {
        let mut m = manager();
        let mut ctx = OperationContext::new("admin");
        let (category, folder) = plan_with_folder(&mut m, &mut ctx);
        assert!(matches!(
            m.create_file_plan(&mut ctx, "again"),
            Err(RetentionError::FilePlanExists(_))
        ));
        assert!(matches!(
            m.create_folder(&mut ctx, &category, "Invoices"),
            Err(RetentionError::NameExists { .. })
        ));
        assert!(matches!(
            m.create_folder(&mut ctx, &folder, "nested"),
            Err(RetentionError::UnexpectedNodeKind { .. })
        ));
    }

    #[test]
    fn filing_defaults_date_filed_and_allows_new_protected_values() {
        let mut m = manager();
        let mut admin = OperationContext::new("admin").at(at("2024-02-01T00:00:00Z"));
        let (_, folder) = plan_with_folder(&mut m, &mut admin);

        let mut clerk = OperationContext::new("clerk").at(at("2024-02-02T00:00:00Z"));
        let mut props = Properties::new();
        props.insert(model::PROP_ORIGINATOR, "clerk".into());
        let record = m.file_record(&mut clerk, &folder, "inv-1", props).unwrap();
        assert_eq!(
            m.store().date_property(&record, &PROP_DATE_FILED),
            Some(at("2024-02-02T00:00:00Z"))
        );
        assert!(m.store().has_aspect(&record, &model::ASPECT_RECORD));

        // once filed, the clerk cannot change the protected value
        let err = m
            .set_property(&mut clerk, &record, PROP_DATE_FILED, Some(at("2020-01-01T00:00:00Z").into()))
            .unwrap_err();
        assert!(matches!(err, RetentionError::ProtectedPropertyDenied { .. }));
        // unprotected edits are fine
        m.set_property(&mut clerk, &record, QName::from_static("cm:title"), Some("Invoice".into()))
            .unwrap();
        // rewriting the same value is not an edit
        m.set_property(&mut clerk, &record, model::PROP_ORIGINATOR, Some("clerk".into()))
            .unwrap();
    }

    #[test]
    fn filing_rejects_protected_values_without_allow_new() {
        let mut m = manager();
        let mut admin = OperationContext::new("admin");
        let (_, folder) = plan_with_folder(&mut m, &mut admin);
        let mut clerk = OperationContext::new("clerk");
        let mut props = Properties::new();
        props.insert(model::PROP_CUT_OFF_DATE, Utc::now().into());
        let err = m.file_record(&mut clerk, &folder, "r", props).unwrap_err();
        assert!(matches!(err, RetentionError::ProtectedPropertyDenied { .. }));
        // the whole filing rolled back
        assert!(m.resolve("Finance/Invoices/r").is_none());
    }

    #[test]
    fn aspect_edits_are_gated() {
        let mut m = manager();
        let mut admin = OperationContext::new("admin");
        let (_, folder) = plan_with_folder(&mut m, &mut admin);
        let mut clerk = OperationContext::new("clerk");
        let err = m
            .add_aspect(&mut clerk, &folder, &model::ASPECT_CUT_OFF, Properties::new())
            .unwrap_err();
        assert!(matches!(err, RetentionError::ProtectedAspectDenied { .. }));

        let mut props = Properties::new();
        props.insert(model::PROP_CUT_OFF_DATE, Utc::now().into());
        m.add_aspect(&mut admin, &folder, &model::ASPECT_CUT_OFF, props).unwrap();
        assert!(m.store().property(&folder, &model::PROP_CUT_OFF_DATE).is_some());
        m.remove_aspect(&mut admin, &folder, &model::ASPECT_CUT_OFF).unwrap();
        assert!(!m.store().has_aspect(&folder, &model::ASPECT_CUT_OFF));
        assert!(m.store().property(&folder, &model::PROP_CUT_OFF_DATE).is_none());
    }

    #[test]
    fn hold_management_needs_capabilities() {
        let mut m = manager();
        let mut admin = OperationContext::new("admin");
        let (_, folder) = plan_with_folder(&mut m, &mut admin);
        let mut clerk = OperationContext::new("clerk");

        assert!(matches!(
            m.create_hold(&mut clerk, "Audit", "audit", None),
            Err(RetentionError::AccessDenied { .. })
        ));
        let hold = m.create_hold(&mut admin, "Audit", "audit", None).unwrap();
        assert!(matches!(
            m.add_to_hold(&mut clerk, &hold, &folder),
            Err(RetentionError::AccessDenied { .. })
        ));
        m.add_to_hold(&mut admin, &hold, &folder).unwrap();
        assert!(m.is_frozen(&folder));
        assert_eq!(m.get_holds(), vec![hold.clone()]);
        assert_eq!(m.get_hold("Audit"), Some(hold.clone()));

        let mut system = OperationContext::system();
        m.remove_from_hold(&mut system, &hold, &folder).unwrap();
        assert!(!m.is_frozen(&folder));
        m.delete_hold(&mut admin, &hold).unwrap();
        assert!(m.get_holds().is_empty());
    }

    #[test]
    fn vital_definition_edits_flow_to_records() {
        let mut m = manager();
        let mut admin = OperationContext::new("admin").at(at("2024-01-01T00:00:00Z"));
        let (_, folder) = plan_with_folder(&mut m, &mut admin);
        let record = m.file_record(&mut admin, &folder, "r", Properties::new()).unwrap();
        assert!(!m.is_vital_record(&record));

        let period: Period = "day|30".parse().unwrap();
        let def = m
            .set_vital_record_definition(&mut admin, &folder, true, period)
            .unwrap();
        assert_eq!(m.get_vital_record_definition(&record).unwrap(), Some(def));
        assert!(m.is_vital_record(&record));

        let mut clerk = OperationContext::new("clerk");
        assert!(matches!(
            m.set_vital_record_definition(&mut clerk, &folder, false, period),
            Err(RetentionError::ProtectedPropertyDenied { .. })
        ));
        assert!(m.is_vital_record(&record));
    }

    #[test]
    fn events_in_use_cannot_be_removed() {
        let mut m = manager();
        let mut admin = OperationContext::new("admin");
        let (category, _) = plan_with_folder(&mut m, &mut admin);
        m.create_disposition_schedule(&category, ScheduleSpec::default()).unwrap();
        m.add_disposition_action_definition(
            &mut admin,
            &category,
            ActionDefinitionSpec {
                name: "cutoff".into(),
                events: vec!["case_closed".into()],
                ..Default::default()
            },
        )
        .unwrap();
        assert!(matches!(
            m.remove_event("case_closed"),
            Err(RetentionError::EventInUse(_))
        ));
        assert!(m.remove_event("abolished").is_ok());
        assert!(!m.exists_event("abolished"));
    }

    #[test]
    fn records_filed_into_held_folder_are_marked_frozen() {
        let mut m = manager();
        let mut admin = OperationContext::new("admin").at(at("2024-03-01T00:00:00Z"));
        let (_, folder) = plan_with_folder(&mut m, &mut admin);
        let hold = m.create_hold(&mut admin, "Audit", "audit", None).unwrap();
        m.add_to_hold(&mut admin, &hold, &folder).unwrap();

        let record = m.file_record(&mut admin, &folder, "later.pdf", Properties::new()).unwrap();
        assert!(m.is_frozen(&record));
        assert!(m.store().has_aspect(&record, &model::ASPECT_FROZEN));
        assert_eq!(
            m.store().date_property(&record, &model::PROP_FROZEN_AT),
            Some(at("2024-03-01T00:00:00Z"))
        );

        m.remove_from_hold(&mut admin, &hold, &folder).unwrap();
        assert!(!m.store().has_aspect(&record, &model::ASPECT_FROZEN));
    }

    #[test]
    fn hold_reason_and_exclusion_query() {
        let mut m = manager();
        let mut admin = OperationContext::new("admin");
        let (_, folder) = plan_with_folder(&mut m, &mut admin);
        let audit = m.create_hold(&mut admin, "Audit", "audit", None).unwrap();
        let lawsuit = m.create_hold(&mut admin, "Lawsuit", "claim 42", None).unwrap();
        m.add_to_hold(&mut admin, &audit, &folder).unwrap();
        assert_eq!(m.held_by(&folder, true), vec![audit.clone()]);
        assert_eq!(m.held_by(&folder, false), vec![lawsuit.clone()]);

        let mut clerk = OperationContext::new("clerk");
        assert!(matches!(
            m.set_hold_reason(&mut clerk, &lawsuit, "claim 43"),
            Err(RetentionError::AccessDenied { .. })
        ));
        m.set_hold_reason(&mut admin, &lawsuit, "claim 43").unwrap();
        assert_eq!(m.get_hold_reason(&lawsuit).unwrap().as_deref(), Some("claim 43"));
    }

    #[test]
    fn manual_cutoff_needs_approval_capability() {
        let mut m = manager();
        let mut admin = OperationContext::new("admin");
        let (category, folder) = plan_with_folder(&mut m, &mut admin);
        m.create_disposition_schedule(&category, ScheduleSpec::default()).unwrap();
        m.add_disposition_action_definition(
            &mut admin,
            &category,
            ActionDefinitionSpec {
                name: "cutoff".into(),
                events: vec!["case_closed".into()],
                eligible_on_first_complete_event: true,
                ..Default::default()
            },
        )
        .unwrap();

        let mut clerk = OperationContext::new("clerk");
        assert!(matches!(
            m.cutoff_disposable_item(&mut clerk, &folder),
            Err(RetentionError::AccessDenied { .. })
        ));
        assert!(!m.is_disposable_item_cutoff(&folder));
        assert_eq!(m.cutoff_disposable_item(&mut admin, &folder).unwrap(), None);
        assert!(m.is_disposable_item_cutoff(&folder));
        assert_eq!(m.get_completed_disposition_actions(&folder).len(), 1);
    }

    #[test]
    fn invalid_step_update_changes_nothing() {
        let mut m = manager();
        let mut admin = OperationContext::new("admin");
        let (category, folder) = plan_with_folder(&mut m, &mut admin);
        m.create_disposition_schedule(&category, ScheduleSpec::default()).unwrap();
        let step = m
            .add_disposition_action_definition(
                &mut admin,
                &category,
                ActionDefinitionSpec {
                    name: "cutoff".into(),
                    period: Some("year|1".parse().unwrap()),
                    ..Default::default()
                },
            )
            .unwrap();
        let before = m.get_next_disposition_action(&folder).unwrap();
        let err = m
            .update_disposition_action_definition(
                &mut admin,
                &category,
                &step.id,
                ActionDefinitionSpec {
                    name: "shred".into(),
                    period: Some("year|2".parse().unwrap()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, RetentionError::UnknownDispositionStep(_)));
        assert_eq!(m.get_next_disposition_action(&folder).unwrap(), before);
        assert_eq!(
            m.get_disposition_schedule(&category).unwrap().definitions[0].period,
            step.period
        );
    }
}
