//! Typed payloads stored on nodes.
//!
//! A node's domain state lives in its *data object*: an opaque, typed value
//! the tree never inspects beyond equality and the staff-only marker. Domain
//! crates implement [`DataObjectType`] for plain serde structs and get
//! [`DataObject`] for free.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use sptree::{DataObject, DataObjectType};
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct Note {
//!     text: String,
//! }
//!
//! impl DataObjectType for Note {
//!     const TYPE_NAME: &'static str = "Note";
//! }
//!
//! let a: Box<dyn DataObject> = Box::new(Note { text: "hi".into() });
//! let b = a.clone();
//! assert!(a.same_as(b.as_ref()));
//! assert_eq!(b.downcast_ref::<Note>().unwrap().text, "hi");
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::serializer::SerializeError;

/// Object-safe view of a node payload.
pub trait DataObject: Any + fmt::Debug + Send + Sync {
    /// Name used to tag the value in serialized documents.
    fn type_name(&self) -> &'static str;

    /// Deep copy of the value.
    fn clone_object(&self) -> Box<dyn DataObject>;

    /// Value equality across the object-safe boundary.
    fn same_as(&self, other: &dyn DataObject) -> bool;

    /// `true` if the value carries fields only staff may see.
    fn has_staff_only_fields(&self) -> bool {
        false
    }

    fn to_json(&self) -> Result<Value, serde_json::Error>;

    fn as_any(&self) -> &dyn Any;
}

/// Implemented by concrete payload types; provides [`DataObject`].
pub trait DataObjectType:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    const TYPE_NAME: &'static str;

    fn staff_only(&self) -> bool {
        false
    }
}

impl<T: DataObjectType> DataObject for T {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn clone_object(&self) -> Box<dyn DataObject> {
        Box::new(self.clone())
    }

    fn same_as(&self, other: &dyn DataObject) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn has_staff_only_fields(&self) -> bool {
        self.staff_only()
    }

    fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn DataObject {
    /// Returns the concrete value if it is a `T`.
    pub fn downcast_ref<T: DataObject>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: DataObject>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

impl Clone for Box<dyn DataObject> {
    fn clone(&self) -> Self {
        self.clone_object()
    }
}

impl PartialEq for Box<dyn DataObject> {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other.as_ref())
    }
}

/// Two-level classification of observation and sequence components,
/// e.g. `Instrument:GMOS-N` or `Iterator:Offset`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentType {
    pub broad: String,
    pub narrow: String,
}

impl ComponentType {
    pub fn new(broad: impl Into<String>, narrow: impl Into<String>) -> Self {
        Self {
            broad: broad.into(),
            narrow: narrow.into(),
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.broad, self.narrow)
    }
}

type Decoder = fn(Value) -> Result<Box<dyn DataObject>, serde_json::Error>;

fn decode<T: DataObjectType>(value: Value) -> Result<Box<dyn DataObject>, serde_json::Error> {
    let object: T = serde_json::from_value(value)?;
    Ok(Box::new(object))
}

/// Maps serialized type names back to concrete [`DataObjectType`]s.
#[derive(Clone, Default)]
pub struct TypeResolver {
    decoders: HashMap<&'static str, Decoder>,
}

impl TypeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under its [`DataObjectType::TYPE_NAME`].
    pub fn register<T: DataObjectType>(&mut self) -> &mut Self {
        self.decoders.insert(T::TYPE_NAME, decode::<T>);
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<T: DataObjectType>(mut self) -> Self {
        self.register::<T>();
        self
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// Rebuilds a data object from its type name and JSON form.
    pub fn resolve(
        &self,
        type_name: &str,
        value: Value,
    ) -> crate::Result<Box<dyn DataObject>> {
        let decoder =
            self.decoders
                .get(type_name)
                .ok_or_else(|| SerializeError::UnknownDataObjectType {
                    name: type_name.to_string(),
                })?;
        decoder(value).map_err(|e| {
            SerializeError::LoadFailed {
                reason: format!("cannot decode {type_name}: {e}"),
            }
            .into()
        })
    }
}

impl fmt::Debug for TypeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.decoders.keys().collect();
        names.sort();
        f.debug_struct("TypeResolver").field("types", &names).finish()
    }
}
