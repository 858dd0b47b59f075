//! Whole-document storage.
//!
//! A document is stored as one JSON envelope holding the document state and
//! the full node tree below the root:
//!
//! ```text
//! { "format": 1, "document": { "key": ..., "versions": ... }, "root": { ... } }
//! ```
//!
//! Data objects are written tagged with their [`DataObject::type_name`] and
//! rebuilt on load through a [`TypeResolver`]. Listeners, event monitors and
//! transient client data are not stored; a loaded document starts with none.

mod errors;

pub use errors::SerializeError;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::constants::SERIAL_FORMAT_VERSION;
use crate::data_object::{ComponentType, DataObject, TypeResolver};
use crate::document::Document;
use crate::factory::Factory;
use crate::keys::{DatabaseId, LifespanId, NodeKey, ProgramId};
use crate::node::snapshot::{NodeSnapshot, build_subtree};
use crate::node::{ConflictNote, Conflicts, DataObjectConflict, Node, NodeType, Perspective};
use crate::version::VersionMap;

#[derive(Serialize, Deserialize)]
struct Envelope {
    format: u32,
    document: StoredDocument,
    root: StoredNode,
}

#[derive(Serialize, Deserialize)]
struct StoredDocument {
    key: NodeKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    program_id: Option<ProgramId>,
    database_id: DatabaseId,
    lifespan: LifespanId,
    versions: VersionMap,
    last_modified: u64,
    max_observation_number: i32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    client_data: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct StoredNode {
    key: NodeKey,
    node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    component_type: Option<ComponentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    obs_number: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_object: Option<TaggedObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conflicts: Option<StoredConflicts>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    extensions: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    slots: Vec<Vec<StoredNode>>,
}

#[derive(Serialize, Deserialize)]
struct TaggedObject {
    #[serde(rename = "type")]
    type_name: String,
    value: Value,
}

#[derive(Serialize, Deserialize)]
struct StoredConflicts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_object: Option<StoredDataObjectConflict>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    notes: Vec<ConflictNote>,
}

#[derive(Serialize, Deserialize)]
struct StoredDataObjectConflict {
    perspective: Perspective,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    object: Option<TaggedObject>,
}

fn store_failed(reason: impl Into<String>) -> crate::Error {
    SerializeError::StoreFailed {
        reason: reason.into(),
    }
    .into()
}

fn load_failed(reason: impl Into<String>) -> crate::Error {
    SerializeError::LoadFailed {
        reason: reason.into(),
    }
    .into()
}

fn tag(object: &dyn DataObject) -> Result<TaggedObject> {
    let value = object
        .to_json()
        .map_err(|e| store_failed(format!("cannot encode {}: {e}", object.type_name())))?;
    Ok(TaggedObject {
        type_name: object.type_name().to_string(),
        value,
    })
}

impl StoredNode {
    fn from_snapshot(snapshot: NodeSnapshot) -> Result<Self> {
        let conflicts = match snapshot.conflicts {
            Some(conflicts) => Some(StoredConflicts {
                data_object: conflicts
                    .data_object_conflict
                    .map(|c| -> Result<_> {
                        Ok(StoredDataObjectConflict {
                            perspective: c.perspective,
                            object: c.data_object.as_deref().map(tag).transpose()?,
                        })
                    })
                    .transpose()?,
                notes: conflicts.notes,
            }),
            None => None,
        };
        Ok(Self {
            key: snapshot.key,
            node_type: snapshot.node_type,
            component_type: snapshot.component_type,
            obs_number: snapshot.obs_number,
            data_object: snapshot
                .data_object
                .map(|object| tag(object.as_ref()))
                .transpose()?,
            conflicts,
            extensions: snapshot.extensions,
            slots: snapshot
                .slots
                .into_iter()
                .map(|slot| slot.into_iter().map(StoredNode::from_snapshot).collect())
                .collect::<Result<_>>()?,
        })
    }

    fn into_snapshot(self, resolver: &TypeResolver) -> Result<NodeSnapshot> {
        let resolve = |tagged: TaggedObject| resolver.resolve(&tagged.type_name, tagged.value);
        let conflicts = match self.conflicts {
            Some(stored) => Some(Conflicts {
                data_object_conflict: stored
                    .data_object
                    .map(|c| -> Result<_> {
                        Ok(DataObjectConflict {
                            perspective: c.perspective,
                            data_object: c.object.map(resolve).transpose()?,
                        })
                    })
                    .transpose()?,
                notes: stored.notes,
            }),
            None => None,
        };
        Ok(NodeSnapshot {
            key: self.key,
            node_type: self.node_type,
            component_type: self.component_type,
            obs_number: self.obs_number,
            data_object: self.data_object.map(resolve).transpose()?,
            conflicts,
            extensions: self.extensions,
            slots: self
                .slots
                .into_iter()
                .map(|slot| {
                    slot.into_iter()
                        .map(|child| child.into_snapshot(resolver))
                        .collect()
                })
                .collect::<Result<_>>()?,
        })
    }
}

/// Stores and loads whole documents.
///
/// ```
/// use sptree::{Factory, Serializer, TypeResolver};
///
/// let factory = Factory::new();
/// let program = factory.create_program(None, None)?;
/// program.add_observation(&factory.create_observation(&program, None, None)?)?;
///
/// let serializer = Serializer::new(TypeResolver::new());
/// let bytes = serializer.store(&program)?;
/// let loaded = serializer.load(&bytes, &factory)?;
/// assert_eq!(loaded.key(), program.key());
/// assert_eq!(loaded.observations().len(), 1);
/// # Ok::<(), sptree::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Serializer {
    resolver: TypeResolver,
}

impl Serializer {
    pub fn new(resolver: TypeResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &TypeResolver {
        &self.resolver
    }

    /// Writes the document rooted at `root`. The document's read lock is held
    /// until the bytes are complete.
    pub fn store(&self, root: &Node) -> Result<Vec<u8>> {
        if !root.node_type().is_root() {
            return Err(store_failed(format!(
                "node {} ({}) is not a document root",
                root.key(),
                root.node_type()
            )));
        }
        let doc = root.document();
        let _lock = doc.read_operation();

        let envelope = Envelope {
            format: SERIAL_FORMAT_VERSION,
            document: StoredDocument {
                key: doc.key(),
                program_id: doc.program_id().cloned(),
                database_id: doc.database_id(),
                lifespan: doc.lifespan_id(),
                versions: doc.versions(),
                last_modified: doc.last_modified(),
                max_observation_number: doc.max_observation_number(),
                client_data: doc.all_client_data().into_iter().collect(),
            },
            root: StoredNode::from_snapshot(root.snapshot())?,
        };
        let bytes = serde_json::to_vec(&envelope).map_err(|e| store_failed(e.to_string()))?;
        tracing::debug!(document = %doc.key(), bytes = bytes.len(), "stored document");
        Ok(bytes)
    }

    /// Rebuilds a stored document and returns its root.
    ///
    /// The document takes its lock from `factory`'s registry and its clock
    /// from the factory; everything else comes from the stream. Any failure
    /// aborts the whole load.
    pub fn load(&self, bytes: &[u8], factory: &Factory) -> Result<Node> {
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| load_failed(e.to_string()))?;
        if envelope.format != SERIAL_FORMAT_VERSION {
            return Err(SerializeError::UnsupportedFormat {
                version: envelope.format,
            }
            .into());
        }
        if !envelope.root.node_type.is_root() {
            return Err(load_failed(format!(
                "stored root is a {}",
                envelope.root.node_type
            )));
        }
        if envelope.root.key != envelope.document.key {
            return Err(load_failed("root key does not match document key"));
        }

        self.rebuild(envelope, factory).map_err(|e| match e {
            crate::Error::Serialize(SerializeError::LoadFailed { .. }) => e,
            other => load_failed(other.to_string()),
        })
    }

    fn rebuild(&self, envelope: Envelope, factory: &Factory) -> Result<Node> {
        let stored = envelope.document;
        let snapshot = envelope.root.into_snapshot(&self.resolver)?;

        let doc = Document::new(
            stored.key,
            stored.program_id,
            stored.database_id,
            stored.lifespan,
            factory.lock_registry().lock_for(stored.key),
            Arc::clone(factory.clock()),
        );
        let _lock = doc.write_operation()?;
        let nodes = snapshot.len();
        let root = build_subtree(&doc, snapshot, true, &mut |_: &Node| Ok(()))?;

        doc.set_versions(stored.versions)?;
        for (name, value) in stored.client_data {
            doc.put_client_data(name, value)?;
        }
        let max = stored
            .max_observation_number
            .max(doc.max_observation_number());
        doc.update_next_observation_number(max)?;
        doc.set_last_modified(stored.last_modified)?;

        tracing::debug!(document = %doc.key(), nodes, "loaded document");
        Ok(root)
    }

    /// Stores the document rooted at `root` into the file at `path`.
    pub fn save_to_file<P: AsRef<Path>>(&self, root: &Node, path: P) -> Result<()> {
        let bytes = self.store(root)?;
        std::fs::write(path, bytes).map_err(|source| SerializeError::FileIo { source }.into())
    }

    /// Loads a document previously written by [`save_to_file`](Self::save_to_file).
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P, factory: &Factory) -> Result<Node> {
        let bytes = std::fs::read(path).map_err(|source| -> crate::Error {
            SerializeError::FileIo { source }.into()
        })?;
        self.load(&bytes, factory)
    }
}
