//! Client data: the data object, the conflict record and named extensions.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;

use super::events::EventValue;
use super::{Conflicts, Node, NodeError, PropagationId};
use crate::Result;
use crate::constants::{
    CONFLICTS_KEY, DATA_OBJECT_KEY, client_data_property_name,
    transient_client_data_property_name,
};
use crate::data_object::{DataObject, DataObjectType};
use crate::version::VersionVector;

/// A value held in one of a node's client data slots.
///
/// The [`DATA_OBJECT_KEY`] slot holds a [`DataObject`], the [`CONFLICTS_KEY`]
/// slot holds [`Conflicts`], and every other name holds a JSON extension.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientData {
    DataObject(Box<dyn DataObject>),
    Conflicts(Conflicts),
    Extension(Value),
}

impl ClientData {
    fn check_slot(&self, name: &str) -> Result<()> {
        let ok = match name {
            DATA_OBJECT_KEY => matches!(self, ClientData::DataObject(_)),
            CONFLICTS_KEY => matches!(self, ClientData::Conflicts(_)),
            _ => matches!(self, ClientData::Extension(_)),
        };
        if ok {
            Ok(())
        } else {
            Err(NodeError::InvalidClientData {
                name: name.to_string(),
            }
            .into())
        }
    }

    fn into_event_value(self) -> EventValue {
        match self {
            ClientData::DataObject(d) => EventValue::DataObject(d),
            ClientData::Conflicts(c) => EventValue::Conflicts(c),
            ClientData::Extension(v) => EventValue::Json(v),
        }
    }
}

impl Node {
    /// Copy of the value in slot `name`.
    pub fn client_data(&self, name: &str) -> Option<ClientData> {
        let _lock = self.read_lock("client_data");
        let record = self.cell.record();
        match name {
            DATA_OBJECT_KEY => record.data_object.clone().map(ClientData::DataObject),
            CONFLICTS_KEY => record.conflicts.clone().map(ClientData::Conflicts),
            _ => record.extensions.get(name).cloned().map(ClientData::Extension),
        }
    }

    /// Names of all occupied client data slots.
    pub fn client_data_keys(&self) -> Vec<String> {
        let _lock = self.read_lock("client_data_keys");
        let record = self.cell.record();
        let mut keys = Vec::with_capacity(record.extensions.len() + 2);
        if record.data_object.is_some() {
            keys.push(DATA_OBJECT_KEY.to_string());
        }
        if record.conflicts.is_some() {
            keys.push(CONFLICTS_KEY.to_string());
        }
        keys.extend(record.extensions.keys().cloned());
        keys
    }

    /// Stores `value` in slot `name`.
    ///
    /// A changed data object is versioned with the node's next version; other
    /// slots are stored without touching the version.
    pub fn put_client_data(&self, name: &str, value: ClientData) -> Result<PropagationId> {
        let _lock = self.write_lock("put_client_data")?;
        let version = self.doc.next_version(self);
        self.put_client_data_and_version(name, value, version)
    }

    fn put_client_data_and_version(
        &self,
        name: &str,
        value: ClientData,
        version: VersionVector,
    ) -> Result<PropagationId> {
        let _lock = self.write_lock("put_client_data")?;
        value.check_slot(name)?;

        let new_value = value.clone().into_event_value();
        let (old_value, changed) = {
            let mut record = self.cell.record_mut();
            match value {
                ClientData::DataObject(d) => {
                    let changed = record
                        .data_object
                        .as_ref()
                        .is_none_or(|old| !old.same_as(d.as_ref()));
                    let old = record.data_object.replace(d);
                    (old.map(EventValue::DataObject), changed)
                }
                ClientData::Conflicts(c) => {
                    let changed = record.conflicts.as_ref() != Some(&c);
                    let old = record.conflicts.replace(c);
                    (old.map(EventValue::Conflicts), changed)
                }
                ClientData::Extension(v) => {
                    let changed = record.extensions.get(name) != Some(&v);
                    let old = record.extensions.insert(name.to_string(), v);
                    (old.map(EventValue::Json), changed)
                }
            }
        };
        if !changed {
            return Ok(PropagationId::EMPTY);
        }
        if name == DATA_OBJECT_KEY && self.version_vector() != version {
            self.doc.mark_modified_with(self.key(), version)?;
        }
        Ok(self.fire_property_change(
            &client_data_property_name(name),
            old_value.unwrap_or(EventValue::None),
            new_value,
        ))
    }

    /// Empties slot `name`, marking the node modified if it was occupied.
    pub fn remove_client_data(&self, name: &str) -> Result<()> {
        let _lock = self.write_lock("remove_client_data")?;
        let old = {
            let mut record = self.cell.record_mut();
            match name {
                DATA_OBJECT_KEY => record.data_object.take().map(EventValue::DataObject),
                CONFLICTS_KEY => record.conflicts.take().map(EventValue::Conflicts),
                _ => record.extensions.remove(name).map(EventValue::Json),
            }
        };
        if let Some(old) = old {
            self.mark_modified()?;
            self.fire_property_change(&client_data_property_name(name), old, EventValue::None);
        }
        Ok(())
    }

    // ---- data object ----

    pub fn data_object(&self) -> Option<Box<dyn DataObject>> {
        let _lock = self.read_lock("data_object");
        self.cell.record().data_object.clone()
    }

    /// Copy of the data object if it is a `T`.
    pub fn data_object_as<T: DataObjectType>(&self) -> Option<T> {
        let _lock = self.read_lock("data_object_as");
        self.cell
            .record()
            .data_object
            .as_ref()
            .and_then(|d| d.downcast_ref::<T>().cloned())
    }

    pub fn set_data_object(&self, value: Box<dyn DataObject>) -> Result<PropagationId> {
        self.put_client_data(DATA_OBJECT_KEY, ClientData::DataObject(value))
    }

    /// Replaces the data object, first saving the current one as a local
    /// data object conflict.
    pub fn set_data_object_with_conflicts(
        &self,
        value: Box<dyn DataObject>,
    ) -> Result<PropagationId> {
        let _lock = self.write_lock("set_data_object_with_conflicts")?;
        if let Some(current) = self.data_object() {
            let conflict = super::DataObjectConflict {
                perspective: super::Perspective::Local,
                data_object: Some(current),
            };
            let conflicts = self.conflicts().with_data_object_conflict(conflict);
            self.put_client_data(CONFLICTS_KEY, ClientData::Conflicts(conflicts))?;
        }
        self.set_data_object(value)
    }

    /// Replaces the data object and forces the node's version to `version`.
    pub fn set_data_object_and_version(
        &self,
        value: Box<dyn DataObject>,
        version: VersionVector,
    ) -> Result<PropagationId> {
        self.put_client_data_and_version(DATA_OBJECT_KEY, ClientData::DataObject(value), version)
    }

    /// `true` if the data object exposes staff-only fields.
    pub fn has_staff_only_fields(&self) -> bool {
        let _lock = self.read_lock("has_staff_only_fields");
        self.cell
            .record()
            .data_object
            .as_ref()
            .is_some_and(|d| d.has_staff_only_fields())
    }

    // ---- transient client data ----

    /// Transient values are neither versioned nor serialized.
    pub fn transient_client_data(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        let _lock = self.read_lock("transient_client_data");
        self.cell.record().transient.get(key).cloned()
    }

    pub fn put_transient_client_data(
        &self,
        key: &str,
        value: Arc<dyn Any + Send + Sync>,
    ) -> Result<()> {
        let _lock = self.write_lock("put_transient_client_data")?;
        let old = self
            .cell
            .record_mut()
            .transient
            .insert(key.to_string(), Arc::clone(&value));
        self.fire_transient_change(
            &transient_client_data_property_name(key),
            old.map(EventValue::Transient).unwrap_or(EventValue::None),
            EventValue::Transient(value),
        );
        Ok(())
    }

    pub fn remove_transient_client_data(&self, key: &str) -> Result<()> {
        let _lock = self.write_lock("remove_transient_client_data")?;
        let old = self.cell.record_mut().transient.remove(key);
        if let Some(old) = old {
            self.fire_transient_change(
                &transient_client_data_property_name(key),
                EventValue::Transient(old),
                EventValue::None,
            );
        }
        Ok(())
    }
}
