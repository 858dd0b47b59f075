//! Conflict records kept on nodes after reconciling replicas.
//!
//! A node can carry at most one outstanding data object conflict (the value
//! that lost, and whose side it came from) plus a set of notes describing
//! structural conflicts that were resolved automatically but should be shown
//! to the user.

use serde::{Deserialize, Serialize};

use super::Node;
use crate::Result;
use crate::constants::{CONFLICTS_KEY, DATA_OBJECT_KEY};
use crate::data_object::DataObject;
use crate::keys::NodeKey;
use crate::node::ClientData;

/// Which side of a merge a conflicting value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Perspective {
    Local,
    Remote,
}

impl Perspective {
    pub fn opposite(self) -> Self {
        match self {
            Perspective::Local => Perspective::Remote,
            Perspective::Remote => Perspective::Local,
        }
    }
}

/// A data object value that lost a merge. `None` when the losing side had
/// no data object.
#[derive(Debug, Clone)]
pub struct DataObjectConflict {
    pub perspective: Perspective,
    pub data_object: Option<Box<dyn DataObject>>,
}

impl PartialEq for DataObjectConflict {
    fn eq(&self, other: &Self) -> bool {
        let same_object = match (&self.data_object, &other.data_object) {
            (Some(a), Some(b)) => a.same_as(b.as_ref()),
            (None, None) => true,
            _ => false,
        };
        self.perspective == other.perspective && same_object
    }
}

/// Structural conflict notes. Each names the node it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ConflictNote {
    /// The node was moved to `destination` by the other side.
    Moved { node: NodeKey, destination: NodeKey },
    /// A node deleted locally was kept because the remote side edited it.
    ResurrectedLocalDelete { node: NodeKey },
    /// A node deleted remotely was kept because the local side edited it.
    ReplacedRemoteDelete { node: NodeKey },
    CreatePermissionFail { node: NodeKey },
    UpdatePermissionFail { node: NodeKey },
    DeletePermissionFail { node: NodeKey },
    /// The merged tree broke a constraint and the node was parked.
    ConstraintViolation { node: NodeKey },
}

impl ConflictNote {
    pub fn node_key(&self) -> NodeKey {
        match self {
            ConflictNote::Moved { node, .. }
            | ConflictNote::ResurrectedLocalDelete { node }
            | ConflictNote::ReplacedRemoteDelete { node }
            | ConflictNote::CreatePermissionFail { node }
            | ConflictNote::UpdatePermissionFail { node }
            | ConflictNote::DeletePermissionFail { node }
            | ConflictNote::ConstraintViolation { node } => *node,
        }
    }
}

/// Conflict record of one node. Values are immutable; edits return a copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conflicts {
    pub data_object_conflict: Option<DataObjectConflict>,
    pub notes: Vec<ConflictNote>,
}

impl Conflicts {
    pub fn is_empty(&self) -> bool {
        self.data_object_conflict.is_none() && self.notes.is_empty()
    }

    pub fn with_data_object_conflict(&self, conflict: DataObjectConflict) -> Self {
        Self {
            data_object_conflict: Some(conflict),
            notes: self.notes.clone(),
        }
    }

    /// Adds `note` unless an equal note is already present.
    pub fn with_conflict_note(&self, note: ConflictNote) -> Self {
        let mut notes = self.notes.clone();
        if !notes.contains(&note) {
            notes.push(note);
        }
        Self {
            data_object_conflict: self.data_object_conflict.clone(),
            notes,
        }
    }

    pub fn resolve_data_object_conflict(&self) -> Self {
        Self {
            data_object_conflict: None,
            notes: self.notes.clone(),
        }
    }

    pub fn resolve_conflict_note(&self, note: &ConflictNote) -> Self {
        Self {
            data_object_conflict: self.data_object_conflict.clone(),
            notes: self.notes.iter().filter(|n| *n != note).cloned().collect(),
        }
    }
}

impl Node {
    /// The node's conflict record; empty when there is none.
    pub fn conflicts(&self) -> Conflicts {
        let _lock = self.read_lock("conflicts");
        self.cell.record().conflicts.clone().unwrap_or_default()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts().is_empty()
    }

    /// Stores `conflicts`; an empty record removes the slot.
    pub fn set_conflicts(&self, conflicts: Conflicts) -> Result<()> {
        if conflicts.is_empty() {
            self.remove_client_data(CONFLICTS_KEY)
        } else {
            self.put_client_data(CONFLICTS_KEY, ClientData::Conflicts(conflicts))
                .map(|_| ())
        }
    }

    /// Exchanges the live data object with the conflicting one and flips the
    /// conflict's perspective. Does nothing without a data object conflict.
    pub fn swap_data_object_conflict(&self) -> Result<()> {
        let _lock = self.write_lock("swap_data_object_conflict")?;
        let old = self.conflicts();
        let Some(conflict) = old.data_object_conflict.clone() else {
            return Ok(());
        };
        let swapped = DataObjectConflict {
            perspective: conflict.perspective.opposite(),
            data_object: self.data_object(),
        };
        self.put_client_data(
            CONFLICTS_KEY,
            ClientData::Conflicts(old.with_data_object_conflict(swapped)),
        )?;
        match conflict.data_object {
            Some(restored) => self.set_data_object(restored).map(|_| ()),
            None => self.remove_client_data(DATA_OBJECT_KEY),
        }
    }

    pub fn add_conflict_note(&self, note: ConflictNote) -> Result<()> {
        let _lock = self.write_lock("add_conflict_note")?;
        self.set_conflicts(self.conflicts().with_conflict_note(note))
    }

    pub fn resolve_data_object_conflict(&self) -> Result<()> {
        let _lock = self.write_lock("resolve_data_object_conflict")?;
        self.set_conflicts(self.conflicts().resolve_data_object_conflict())
    }

    pub fn resolve_conflict_note(&self, note: &ConflictNote) -> Result<()> {
        let _lock = self.write_lock("resolve_conflict_note")?;
        self.set_conflicts(self.conflicts().resolve_conflict_note(note))
    }

    pub fn resolve_conflicts(&self) -> Result<()> {
        self.set_conflicts(Conflicts::default())
    }
}
