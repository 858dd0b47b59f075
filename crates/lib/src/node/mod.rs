//! Nodes of the science program tree.
//!
//! Nodes live in their [`Document`]'s arena and are addressed by [`NodeKey`].
//! A [`Node`] is a cheap handle pairing the document with one arena cell.
//! Each cell records its parent as a key (non-owning) and, for containers,
//! owns ordered lists of child keys, one per slot declared by its
//! [`NodeType`].
//!
//! The node API is split by concern:
//!
//! * tree links and navigation (this module),
//! * client data and the data object (`client_data`),
//! * conflict records (`conflicts`),
//! * change notification (`events`),
//! * typed child collections (`container`),
//! * detached subtree copies used by the factory and serializer (`snapshot`).

mod client_data;
mod conflicts;
mod container;
mod errors;
mod events;
mod kind;
pub(crate) mod snapshot;

pub use client_data::ClientData;
pub use conflicts::{ConflictNote, Conflicts, DataObjectConflict, Perspective};
pub use errors::NodeError;
pub use events::{
    EventMonitor, EventValue, ListenerId, PropagationId, PropertyChange, StructureChange,
};
pub use kind::{Cardinality, NodeType, SlotDef};

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use crate::Result;
use crate::data_object::{ComponentType, DataObject};
use crate::document::Document;
use crate::keys::{LifespanId, NodeKey, ProgramId};
use crate::lock::{LockError, ReadGuard, WriteGuard};
use crate::version::VersionVector;

/// Per-node values behind the cell's lock.
pub(crate) struct NodeRecord {
    parent: Option<NodeKey>,
    obs_number: Option<i32>,
    /// Child keys, one list per slot of the node type's layout.
    slots: Vec<Vec<NodeKey>>,
    data_object: Option<Box<dyn DataObject>>,
    conflicts: Option<Conflicts>,
    extensions: BTreeMap<String, Value>,
    transient: HashMap<String, Arc<dyn Any + Send + Sync>>,
    sending_events: bool,
}

/// Arena entry for one node.
pub(crate) struct NodeCell {
    pub(crate) key: NodeKey,
    pub(crate) node_type: NodeType,
    pub(crate) component_type: Option<ComponentType>,
    record: RwLock<NodeRecord>,
    listeners: Mutex<events::Listeners>,
}

impl NodeCell {
    pub(crate) fn new(
        key: NodeKey,
        node_type: NodeType,
        component_type: Option<ComponentType>,
        obs_number: Option<i32>,
    ) -> Self {
        Self {
            key,
            node_type,
            component_type,
            record: RwLock::new(NodeRecord {
                parent: None,
                obs_number,
                slots: vec![Vec::new(); node_type.layout().len()],
                data_object: None,
                conflicts: None,
                extensions: BTreeMap::new(),
                transient: HashMap::new(),
                sending_events: true,
            }),
            listeners: Mutex::new(events::Listeners::default()),
        }
    }

    fn record(&self) -> RwLockReadGuard<'_, NodeRecord> {
        self.record.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_mut(&self) -> RwLockWriteGuard<'_, NodeRecord> {
        self.record.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn child_keys(&self) -> Vec<NodeKey> {
        self.record().slots.iter().flatten().copied().collect()
    }

    pub(crate) fn parent_key(&self) -> Option<NodeKey> {
        self.record().parent
    }
}

/// Handle to one node of a document.
///
/// Handles are cheap to clone and compare equal when they refer to the same
/// node of the same document.
#[derive(Clone)]
pub struct Node {
    doc: Document,
    cell: Arc<NodeCell>,
}

impl Node {
    pub(crate) fn from_cell(doc: Document, cell: Arc<NodeCell>) -> Self {
        Self { doc, cell }
    }

    pub fn key(&self) -> NodeKey {
        self.cell.key
    }

    pub fn node_type(&self) -> NodeType {
        self.cell.node_type
    }

    /// Component classification for observation and sequence components.
    pub fn component_type(&self) -> Option<&ComponentType> {
        self.cell.component_type.as_ref()
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn is_container(&self) -> bool {
        self.cell.node_type.is_container()
    }

    /// Key of the document, which is also the key of its root node.
    pub fn program_key(&self) -> NodeKey {
        self.doc.key()
    }

    pub fn program_id(&self) -> Option<ProgramId> {
        self.doc.program_id().cloned()
    }

    pub fn lifespan_id(&self) -> LifespanId {
        self.doc.lifespan_id()
    }

    pub(crate) fn read_lock(&self, accessor: &'static str) -> ReadGuard<'_> {
        self.doc.lock().read_internal(accessor)
    }

    pub(crate) fn write_lock(&self, accessor: &'static str) -> Result<WriteGuard<'_>> {
        Ok(self.doc.lock().write_internal(accessor)?)
    }

    fn require_write_lock(&self, operation: &str) -> Result<()> {
        if self.doc.lock().have_write_lock() {
            Ok(())
        } else {
            Err(LockError::WriteLockNotHeld {
                operation: operation.to_string(),
            }
            .into())
        }
    }

    // ---- versions ----

    pub fn version_vector(&self) -> VersionVector {
        self.doc.version_vector(&self.cell.key)
    }

    /// This replica's counter in the node's version.
    pub fn local_version(&self) -> u32 {
        self.doc.local_version(&self.cell.key)
    }

    pub(crate) fn mark_modified(&self) -> Result<()> {
        self.doc.mark_modified(self)
    }

    // ---- observation numbers ----

    pub fn observation_number(&self) -> Option<i32> {
        let _lock = self.read_lock("observation_number");
        self.cell.record().obs_number
    }

    pub(crate) fn set_observation_number(&self, number: i32) -> Result<()> {
        let _lock = self.write_lock("set_observation_number")?;
        self.cell.record_mut().obs_number = Some(number);
        self.doc.ensure_observation_number_at_least(number)?;
        self.mark_modified()
    }

    // ---- tree links ----

    pub fn parent_key(&self) -> Option<NodeKey> {
        let _lock = self.read_lock("parent_key");
        self.cell.record().parent
    }

    pub fn parent(&self) -> Option<Node> {
        self.parent_key().and_then(|key| self.doc.node(&key))
    }

    /// The root this node hangs from, or `None` if it is detached.
    pub fn root_ancestor(&self) -> Option<Node> {
        let _lock = self.read_lock("root_ancestor");
        let mut current = self.clone();
        loop {
            if current.node_type().is_root() {
                return Some(current);
            }
            current = current.parent()?;
        }
    }

    /// `true` if `key` is this node or one of its ancestors.
    pub(crate) fn is_self_or_ancestor(&self, key: NodeKey) -> bool {
        let _lock = self.read_lock("is_self_or_ancestor");
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.key() == key {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// The nearest observation at or above this node.
    ///
    /// Nodes parked in a conflict folder have no context observation.
    pub fn context_observation(&self) -> Option<Node> {
        let _lock = self.read_lock("context_observation");
        let mut current = self.clone();
        loop {
            match current.node_type() {
                NodeType::Observation => return Some(current),
                NodeType::ConflictFolder => return None,
                _ => current = current.parent()?,
            }
        }
    }

    /// All children in slot order.
    pub fn children(&self) -> Vec<Node> {
        let _lock = self.read_lock("children");
        self.cell
            .child_keys()
            .iter()
            .filter_map(|key| self.doc.node(key))
            .collect()
    }

    /// Makes `container` this node's parent.
    ///
    /// Requires the write lock. Marks the container modified, and seeds this
    /// node's version on its first attachment.
    pub(crate) fn attach_to(&self, container: &Node) -> Result<()> {
        if !self.doc.same_document(&container.doc) {
            return Err(NodeError::NotLocal {
                node: self.key(),
                container: container.key(),
            }
            .into());
        }
        self.require_write_lock("attach_to")?;
        {
            let mut record = self.cell.record_mut();
            if let Some(parent) = record.parent {
                return Err(NodeError::TreeState {
                    reason: format!("node {} is already attached to {parent}", self.key()),
                }
                .into());
            }
            record.parent = Some(container.key());
        }
        // Moving a child is a change to the parent, not to the child.
        container.mark_modified()?;
        if !self.doc.contains_version(&self.key()) {
            self.mark_modified()?;
        }
        tracing::debug!(node = %self.key(), container = %container.key(), "attached");
        Ok(())
    }

    /// Clears this node's parent, which must be `container`.
    pub(crate) fn detach_from(&self, container: &Node) -> Result<()> {
        self.require_write_lock("detach_from")?;
        {
            let mut record = self.cell.record_mut();
            if record.parent != Some(container.key()) {
                return Err(NodeError::NotParent {
                    node: self.key(),
                    container: container.key(),
                }
                .into());
            }
            record.parent = None;
        }
        container.mark_modified()?;
        tracing::debug!(node = %self.key(), container = %container.key(), "detached");
        Ok(())
    }

    /// Indented rendering of the subtree rooted here, one node per line.
    pub fn tree_string(&self) -> String {
        let _lock = self.read_lock("tree_string");
        let mut out = String::new();
        self.write_tree(&mut out, 0);
        out
    }

    fn write_tree(&self, out: &mut String, depth: usize) {
        let _ = write!(out, "{:indent$}{}", "", self.node_type(), indent = depth * 2);
        if let Some(number) = self.observation_number() {
            let _ = write!(out, " #{number}");
        }
        if let Some(component) = self.component_type() {
            let _ = write!(out, " ({component})");
        }
        let _ = writeln!(out, " {}", self.key());
        for child in self.children() {
            child.write_tree(out, depth + 1);
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("type", &self.cell.node_type)
            .field("key", &self.cell.key)
            .finish()
    }
}
