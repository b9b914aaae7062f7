//! Property change notification.
//!
//! Writes that should trigger derived-state maintenance go through
//! [`ChangeNotifier::set_properties`], which records the before/after
//! property maps and hands them to every registered listener. A listener is
//! suppressed on the context while it runs, so its own corrective writes
//! through the notifier never re-enter it.

use crate::context::OperationContext;
use crate::error::Result;
use crate::store::{in_transaction, NodeStore};
use crate::types::{NodeId, Properties, PropertyChanges, PropertyValue, QName};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct PropertyUpdate {
    pub node: NodeId,
    pub before: Properties,
    pub after: Properties,
}

impl PropertyUpdate {
    pub fn before(&self, property: &QName) -> Option<&PropertyValue> {
        self.before.get(property)
    }

    pub fn after(&self, property: &QName) -> Option<&PropertyValue> {
        self.after.get(property)
    }

    pub fn is_changed(&self, property: &QName) -> bool {
        self.before(property) != self.after(property)
    }

    pub fn changed(&self) -> BTreeSet<QName> {
        self.before
            .keys()
            .chain(self.after.keys())
            .filter(|k| self.is_changed(k))
            .cloned()
            .collect()
    }
}

pub trait PropertyUpdateListener {
    /// Stable name, used as the suppression key.
    fn name(&self) -> &'static str;

    /// Called after the properties of `update.node` changed, inside the
    /// transaction of the write. An error aborts that transaction.
    fn on_update_properties(
        &self,
        ctx: &mut OperationContext,
        store: &mut dyn NodeStore,
        notifier: &ChangeNotifier,
        update: &PropertyUpdate,
    ) -> Result<()>;
}

#[derive(Default)]
pub struct ChangeNotifier {
    listeners: Vec<Box<dyn PropertyUpdateListener>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Box<dyn PropertyUpdateListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_names(&self) -> Vec<&'static str> {
        self.listeners.iter().map(|l| l.name()).collect()
    }

    /// Apply `changes` to `node` and notify listeners, all in one
    /// transaction.
    pub fn set_properties(
        &self,
        ctx: &mut OperationContext,
        store: &mut dyn NodeStore,
        node: &NodeId,
        changes: PropertyChanges,
    ) -> Result<PropertyUpdate> {
        in_transaction(store, |store| {
            let before = store.require(node)?.properties.clone();
            for (property, value) in changes {
                store.set_property(node, &property, value)?;
            }
            let update = PropertyUpdate {
                node: node.clone(),
                before,
                after: store.properties(node),
            };
            if update.changed().is_empty() {
                return Ok(update);
            }
            for listener in &self.listeners {
                let name = listener.name();
                if ctx.is_suppressed(name) {
                    continue;
                }
                ctx.with_suppressed(name, |ctx| {
                    listener.on_update_properties(ctx, &mut *store, self, &update)
                })?;
            }
            Ok(update)
        })
    }

    pub fn set_property(
        &self,
        ctx: &mut OperationContext,
        store: &mut dyn NodeStore,
        node: &NodeId,
        property: QName,
        value: Option<PropertyValue>,
    ) -> Result<PropertyUpdate> {
        let mut changes = PropertyChanges::new();
        changes.insert(property, value);
        self.set_properties(ctx, store, node, changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetentionError;
    use crate::model::{ASSOC_CONTAINS, PROP_DESCRIPTION, PROP_ORIGINATOR};
    use crate::store::InMemoryStore;
    use crate::types::NodeKind;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Copies the originator into the description, through the notifier.
    struct Echo {
        calls: Rc<Cell<u32>>,
    }

    impl PropertyUpdateListener for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn on_update_properties(
            &self,
            ctx: &mut OperationContext,
            store: &mut dyn NodeStore,
            notifier: &ChangeNotifier,
            update: &PropertyUpdate,
        ) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            if let Some(v) = update.after(&PROP_ORIGINATOR) {
                notifier.set_property(ctx, store, &update.node, PROP_DESCRIPTION, Some(v.clone()))?;
            }
            Ok(())
        }
    }

    struct Reject;

    impl PropertyUpdateListener for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        fn on_update_properties(
            &self,
            _ctx: &mut OperationContext,
            _store: &mut dyn NodeStore,
            _notifier: &ChangeNotifier,
            update: &PropertyUpdate,
        ) -> Result<()> {
            if update.after(&PROP_ORIGINATOR).is_none() && update.before(&PROP_ORIGINATOR).is_some() {
                return Err(RetentionError::IllegalStateMutation {
                    node: update.node.to_string(),
                    property: PROP_ORIGINATOR.to_string(),
                    reason: "cleared".into(),
                });
            }
            Ok(())
        }
    }

    fn record(store: &mut InMemoryStore) -> NodeId {
        store
            .create_node(None, &ASSOC_CONTAINS, NodeKind::Record, "r", Properties::new())
            .unwrap()
    }

    #[test]
    fn listener_is_not_reentered_by_its_own_writes() {
        let calls = Rc::new(Cell::new(0));
        let mut notifier = ChangeNotifier::new();
        notifier.register(Box::new(Echo { calls: calls.clone() }));
        let mut store = InMemoryStore::new();
        let node = record(&mut store);
        let mut ctx = OperationContext::new("alice");

        notifier
            .set_property(&mut ctx, &mut store, &node, PROP_ORIGINATOR, Some("alice".into()))
            .unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(
            store.property(&node, &PROP_DESCRIPTION),
            Some(&PropertyValue::Text("alice".into()))
        );
        assert!(!ctx.is_suppressed("echo"));
    }

    #[test]
    fn unchanged_write_does_not_notify() {
        let calls = Rc::new(Cell::new(0));
        let mut notifier = ChangeNotifier::new();
        notifier.register(Box::new(Echo { calls: calls.clone() }));
        let mut store = InMemoryStore::new();
        let node = record(&mut store);
        let mut ctx = OperationContext::new("alice");

        notifier
            .set_property(&mut ctx, &mut store, &node, PROP_DESCRIPTION, None)
            .unwrap();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn failing_listener_rolls_back_the_write() {
        let mut notifier = ChangeNotifier::new();
        notifier.register(Box::new(Reject));
        let mut store = InMemoryStore::new();
        let node = record(&mut store);
        let mut ctx = OperationContext::new("alice");

        notifier
            .set_property(&mut ctx, &mut store, &node, PROP_ORIGINATOR, Some("alice".into()))
            .unwrap();
        let err = notifier
            .set_property(&mut ctx, &mut store, &node, PROP_ORIGINATOR, None)
            .unwrap_err();
        assert!(matches!(err, RetentionError::IllegalStateMutation { .. }));
        assert_eq!(
            store.property(&node, &PROP_ORIGINATOR),
            Some(&PropertyValue::Text("alice".into()))
        );
    }

    #[test]
    fn changed_lists_added_and_removed_keys() {
        let mut before = Properties::new();
        before.insert(PROP_ORIGINATOR, "a".into());
        let mut after = Properties::new();
        after.insert(PROP_DESCRIPTION, "d".into());
        let update = PropertyUpdate {
            node: NodeId::new("n"),
            before,
            after,
        };
        let changed = update.changed();
        assert!(changed.contains(&PROP_ORIGINATOR));
        assert!(changed.contains(&PROP_DESCRIPTION));
        assert_eq!(changed.len(), 2);
    }
}
