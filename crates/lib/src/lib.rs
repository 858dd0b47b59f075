//!
//! sptree: an in-memory, versioned tree store for science programs.
//!
//! A science program (or nightly record) is a *document*: a tree of typed
//! nodes rooted at a program node, with its own identity, lock, modification
//! clock and causal version history.
//!
//! ## Core Concepts
//!
//! * **Documents (`document::Document`)**: Per-program state shared by every node: keys, the
//!   version map, client data and the observation number counter. All nodes live in the
//!   document's arena.
//! * **Nodes (`node::Node`)**: Cheap handles to one node. A node has a parent link, client data
//!   slots (the typed data object, conflicts, extensions), listeners, and for containers one
//!   ordered child list per slot of its `NodeType`.
//! * **Versions (`version::VersionVector`)**: Every modification bumps the node's counter for the
//!   document's lifespan, so replicas of one program can be compared causally.
//! * **Locks (`lock::ProgramLock`)**: One reentrant read/write lock per document key, handed out
//!   by a `LockRegistry`. Node operations take it implicitly; callers can group several
//!   operations with `Document::read_operation` / `Document::write_operation`.
//! * **Factory (`factory::Factory`)**: Creates documents and nodes, runs `NodeInitializer`s and
//!   deep-copies subtrees, preserving or regenerating identities.
//! * **Serializer (`serializer::Serializer`)**: Stores and loads whole documents as JSON.

pub mod clock;
pub mod constants;
pub mod data_object;
pub mod document;
pub mod factory;
pub mod keys;
pub mod lock;
pub mod node;
pub mod serializer;
pub mod version;

#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use clock::{Clock, SystemClock};
pub use data_object::{ComponentType, DataObject, DataObjectType, TypeResolver};
pub use document::Document;
pub use factory::{Factory, FactoryBuilder, FactoryConfig, FactoryError, NodeInitializer};
pub use keys::{DatabaseId, LifespanId, NodeKey, ProgramId};
pub use lock::{LockError, LockRegistry, ProgramLock, ReadGuard, WriteGuard};
pub use node::{
    Cardinality, ClientData, ConflictNote, Conflicts, DataObjectConflict, EventMonitor,
    EventValue, ListenerId, Node, NodeError, NodeType, Perspective, PropagationId,
    PropertyChange, SlotDef, StructureChange,
};
pub use serializer::{SerializeError, Serializer};
pub use version::{VersionMap, VersionVector};

/// Result type used throughout sptree.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for sptree.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured locking errors from the lock module
    #[error(transparent)]
    Lock(lock::LockError),

    /// Structured tree errors from the node module
    #[error(transparent)]
    Node(node::NodeError),

    /// Structured creation and copy errors from the factory module
    #[error(transparent)]
    Factory(factory::FactoryError),

    /// Structured store and load errors from the serializer module
    #[error(transparent)]
    Serialize(serializer::SerializeError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Lock(_) => "lock",
            Error::Node(_) => "node",
            Error::Factory(_) => "factory",
            Error::Serialize(_) => "serializer",
        }
    }

    /// Check if a node or container from another document was involved.
    pub fn is_not_local(&self) -> bool {
        match self {
            Error::Node(node_err) => node_err.is_not_local(),
            _ => false,
        }
    }

    /// Check if the requested change would leave the tree in an invalid state.
    pub fn is_tree_state(&self) -> bool {
        match self {
            Error::Node(node_err) => node_err.is_tree_state(),
            _ => false,
        }
    }

    /// Check if the caller broke an API precondition.
    pub fn is_precondition(&self) -> bool {
        match self {
            Error::Lock(lock_err) => lock_err.is_precondition(),
            Error::Node(node_err) => node_err.is_precondition(),
            Error::Factory(factory_err) => factory_err.is_precondition(),
            Error::Serialize(_) => false,
        }
    }

    /// Check if this error indicates a node was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Node(node_err) => node_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is a rejected argument value.
    pub fn is_validation_error(&self) -> bool {
        match self {
            Error::Factory(factory_err) => factory_err.is_validation_error(),
            _ => false,
        }
    }

    /// Check if this error is locking-related.
    pub fn is_lock_error(&self) -> bool {
        matches!(self, Error::Lock(_))
    }

    /// Check if this error is a failed store or load.
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Error::Serialize(_))
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Serialize(serialize_err) => serialize_err.is_io_error(),
            _ => false,
        }
    }
}
