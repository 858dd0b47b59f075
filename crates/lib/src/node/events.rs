//! Change notification.
//!
//! Nodes expose four listener channels:
//!
//! * property listeners, optionally filtered by property name, hear changes
//!   to the node itself;
//! * transient property listeners hear changes to transient client data,
//!   which never propagate further;
//! * composite listeners hear property changes of the node and of every
//!   descendant;
//! * structure listeners hear child-list changes of the node and of every
//!   descendant container.
//!
//! Event monitors registered on a node receive the composite and structure
//! events that reach it, after its listeners.
//!
//! Listeners run on the thread making the change, with the program lock held
//! by that thread. They may read the tree freely.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use serde_json::Value;

use super::{Conflicts, Node};
use crate::Result;
use crate::constants::EVENTS_ACTIVATED;
use crate::data_object::DataObject;
use crate::keys::NodeKey;

static NEXT_PROPAGATION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one change as it travels up the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropagationId(u64);

impl PropagationId {
    /// Returned when events are suppressed and nothing was fired.
    pub const EMPTY: PropagationId = PropagationId(0);

    pub(crate) fn next() -> Self {
        Self(NEXT_PROPAGATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

/// Old or new value carried by a change event.
#[derive(Debug, Clone)]
pub enum EventValue {
    None,
    DataObject(Box<dyn DataObject>),
    Conflicts(Conflicts),
    Json(Value),
    Children(Vec<NodeKey>),
    Transient(Arc<dyn Any + Send + Sync>),
}

impl EventValue {
    pub fn is_none(&self) -> bool {
        matches!(self, EventValue::None)
    }

    pub fn as_data_object(&self) -> Option<&dyn DataObject> {
        match self {
            EventValue::DataObject(d) => Some(d.as_ref()),
            _ => None,
        }
    }

    pub fn as_children(&self) -> Option<&[NodeKey]> {
        match self {
            EventValue::Children(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PropertyChange {
    /// Node whose property changed.
    pub source: NodeKey,
    pub property: String,
    pub old_value: EventValue,
    pub new_value: EventValue,
    pub propagation_id: PropagationId,
}

/// A container's child list changed.
#[derive(Debug, Clone)]
pub struct StructureChange {
    /// The container whose children changed.
    pub parent: NodeKey,
    pub property: String,
    pub old_children: Vec<NodeKey>,
    pub new_children: Vec<NodeKey>,
    pub propagation_id: PropagationId,
}

/// Collaborator notified of changes at or below the node it is registered on.
pub trait EventMonitor: Send + Sync {
    fn property_changed(&self, _node: &Node, _event: &PropertyChange) {}

    fn structure_changed(&self, _node: &Node, _event: &StructureChange) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type PropertyListener = Arc<dyn Fn(&PropertyChange) + Send + Sync>;
type StructureListener = Arc<dyn Fn(&StructureChange) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Listeners {
    property: Vec<(ListenerId, Option<String>, PropertyListener)>,
    transient: Vec<(ListenerId, Option<String>, PropertyListener)>,
    composite: Vec<(ListenerId, PropertyListener)>,
    structure: Vec<(ListenerId, StructureListener)>,
    monitors: Vec<(String, Arc<dyn EventMonitor>)>,
}

fn matching(
    listeners: &[(ListenerId, Option<String>, PropertyListener)],
    property: &str,
) -> Vec<PropertyListener> {
    listeners
        .iter()
        .filter(|(_, filter, _)| filter.as_deref().is_none_or(|name| name == property))
        .map(|(_, _, l)| Arc::clone(l))
        .collect()
}

impl Node {
    fn listeners(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.cell
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Listens to changes of `property` on this node, or of every property
    /// when `property` is `None`.
    pub fn add_property_listener<F>(&self, property: Option<&str>, listener: F) -> ListenerId
    where
        F: Fn(&PropertyChange) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.listeners()
            .property
            .push((id, property.map(str::to_string), Arc::new(listener)));
        id
    }

    pub fn add_transient_property_listener<F>(
        &self,
        property: Option<&str>,
        listener: F,
    ) -> ListenerId
    where
        F: Fn(&PropertyChange) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.listeners()
            .transient
            .push((id, property.map(str::to_string), Arc::new(listener)));
        id
    }

    /// Listens to property changes of this node and all its descendants.
    pub fn add_composite_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&PropertyChange) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.listeners().composite.push((id, Arc::new(listener)));
        id
    }

    /// Listens to child-list changes of this node and all its descendants.
    pub fn add_structure_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StructureChange) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.listeners().structure.push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener from whichever channel it was added to.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.property.len()
            + listeners.transient.len()
            + listeners.composite.len()
            + listeners.structure.len();
        listeners.property.retain(|(l, _, _)| *l != id);
        listeners.transient.retain(|(l, _, _)| *l != id);
        listeners.composite.retain(|(l, _)| *l != id);
        listeners.structure.retain(|(l, _)| *l != id);
        let after = listeners.property.len()
            + listeners.transient.len()
            + listeners.composite.len()
            + listeners.structure.len();
        before != after
    }

    /// Registers `monitor` under `name`, replacing any monitor with that name.
    pub fn register_event_monitor(&self, name: impl Into<String>, monitor: Arc<dyn EventMonitor>) {
        let name = name.into();
        let mut listeners = self.listeners();
        listeners.monitors.retain(|(n, _)| *n != name);
        listeners.monitors.push((name, monitor));
    }

    pub fn unregister_event_monitor(&self, name: &str) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.monitors.len();
        listeners.monitors.retain(|(n, _)| n != name);
        before != listeners.monitors.len()
    }

    fn monitors(&self) -> Vec<Arc<dyn EventMonitor>> {
        self.listeners()
            .monitors
            .iter()
            .map(|(_, m)| Arc::clone(m))
            .collect()
    }

    pub fn is_sending_events(&self) -> bool {
        let _lock = self.read_lock("is_sending_events");
        self.cell.record().sending_events
    }

    /// Turns event delivery for this node on or off.
    ///
    /// Switching delivery back on fires an [`EVENTS_ACTIVATED`] composite
    /// change so observers can resynchronize.
    pub fn set_sending_events(&self, sending: bool) -> Result<PropagationId> {
        let _lock = self.write_lock("set_sending_events")?;
        {
            let mut record = self.cell.record_mut();
            if record.sending_events == sending {
                return Ok(PropagationId::EMPTY);
            }
            record.sending_events = sending;
        }
        if !sending {
            return Ok(PropagationId::EMPTY);
        }
        let event = PropertyChange {
            source: self.key(),
            property: EVENTS_ACTIVATED.to_string(),
            old_value: EventValue::None,
            new_value: EventValue::None,
            propagation_id: PropagationId::next(),
        };
        self.fire_composite_change(&event);
        Ok(event.propagation_id)
    }

    pub(crate) fn fire_property_change(
        &self,
        property: &str,
        old_value: EventValue,
        new_value: EventValue,
    ) -> PropagationId {
        if !self.is_sending_events() {
            return PropagationId::EMPTY;
        }
        let event = PropertyChange {
            source: self.key(),
            property: property.to_string(),
            old_value,
            new_value,
            propagation_id: PropagationId::next(),
        };
        let listeners = matching(&self.listeners().property, property);
        for listener in listeners {
            listener(&event);
        }
        self.fire_composite_change(&event);
        event.propagation_id
    }

    fn fire_composite_change(&self, event: &PropertyChange) {
        if !self.is_sending_events() {
            return;
        }
        let composite: Vec<_> = self
            .listeners()
            .composite
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in composite {
            listener(event);
        }
        if let Some(parent) = self.parent() {
            parent.fire_composite_change(event);
        }
        for monitor in self.monitors() {
            monitor.property_changed(self, event);
        }
    }

    pub(crate) fn fire_transient_change(
        &self,
        property: &str,
        old_value: EventValue,
        new_value: EventValue,
    ) {
        let event = PropertyChange {
            source: self.key(),
            property: property.to_string(),
            old_value,
            new_value,
            propagation_id: PropagationId::next(),
        };
        let listeners = matching(&self.listeners().transient, property);
        for listener in listeners {
            listener(&event);
        }
    }

    pub(crate) fn fire_structure_change(
        &self,
        property: &str,
        old_children: Vec<NodeKey>,
        new_children: Vec<NodeKey>,
    ) -> PropagationId {
        if !self.is_sending_events() {
            return PropagationId::EMPTY;
        }
        let event = StructureChange {
            parent: self.key(),
            property: property.to_string(),
            old_children,
            new_children,
            propagation_id: PropagationId::next(),
        };
        self.propagate_structure_change(&event);
        event.propagation_id
    }

    fn propagate_structure_change(&self, event: &StructureChange) {
        if !self.is_sending_events() {
            return;
        }
        let structure: Vec<_> = self
            .listeners()
            .structure
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in structure {
            listener(event);
        }
        for monitor in self.monitors() {
            monitor.structure_changed(self, event);
        }
        if let Some(parent) = self.parent() {
            parent.propagate_structure_change(event);
        }
    }
}
