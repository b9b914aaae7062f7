use crate::behaviour::{ChangeNotifier, PropertyUpdate, PropertyUpdateListener};
use crate::context::OperationContext;
use crate::error::{Result, RetentionError};
use crate::model::{ASPECT_DISPOSITION_LIFECYCLE, PROP_DISPOSITION_AS_OF};
use crate::store::NodeStore;
use crate::types::{PropertyValue, QName};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use super::{get_disposition_action_definition, get_next_disposition_action};

/// Keeps the pending action's as-of date in step with the node property its
/// period is anchored on.
///
/// Setting or changing a watched property recomputes the as-of date from the
/// new value. Clearing it is refused: the pending date would be left without
/// an anchor, so the whole write is rolled back.
pub struct DispositionPropertyListener {
    properties: BTreeSet<QName>,
}

impl DispositionPropertyListener {
    pub const NAME: &'static str = "disposition-property";

    pub fn new(properties: impl IntoIterator<Item = QName>) -> Self {
        DispositionPropertyListener {
            properties: properties.into_iter().collect(),
        }
    }

    pub fn watches(&self, property: &QName) -> bool {
        self.properties.contains(property)
    }
}

impl PropertyUpdateListener for DispositionPropertyListener {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn on_update_properties(
        &self,
        ctx: &mut OperationContext,
        store: &mut dyn NodeStore,
        notifier: &ChangeNotifier,
        update: &PropertyUpdate,
    ) -> Result<()> {
        let node = &update.node;
        if !store.has_aspect(node, &ASPECT_DISPOSITION_LIFECYCLE) {
            return Ok(());
        }
        for property in self.properties.iter().filter(|p| update.is_changed(p)) {
            let Some(action) = get_next_disposition_action(store, node) else {
                return Ok(());
            };
            let Some(definition) = get_disposition_action_definition(store, node) else {
                return Ok(());
            };
            if definition.period_property.as_ref() != Some(property) {
                continue;
            }

            let new_value = match update.after(property) {
                Some(value) => value,
                None => {
                    warn!(node = %node, property = %property, "refusing to clear disposition anchor");
                    return Err(RetentionError::IllegalStateMutation {
                        node: node.to_string(),
                        property: property.to_string(),
                        reason: "it is used to compute a pending disposition date".to_string(),
                    });
                }
            };
            let anchor = new_value.as_date().ok_or_else(|| RetentionError::PropertyType {
                node: node.to_string(),
                property: property.to_string(),
                expected: "date",
            })?;
            let Some(period) = definition.period else {
                continue;
            };
            let as_of = period.next_date(anchor);
            if as_of == action.as_of {
                continue;
            }
            debug!(node = %node, property = %property, as_of = ?as_of, "recomputing disposition as-of date");
            ctx.run_as_system(|ctx| {
                notifier.set_property(
                    ctx,
                    &mut *store,
                    &action.id,
                    PROP_DISPOSITION_AS_OF,
                    as_of.map(PropertyValue::Date),
                )
            })?;
        }
        Ok(())
    }
}
