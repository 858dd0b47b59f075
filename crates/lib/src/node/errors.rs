//! Error types for node and container operations.

use thiserror::Error;

use super::NodeType;
use crate::keys::NodeKey;

/// Errors raised while editing the tree.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum NodeError {
    /// The node belongs to a different document than the container.
    #[error("node {node} is not local to the document of container {container}")]
    NotLocal {
        /// The node being attached
        node: NodeKey,
        /// The container it was attached to
        container: NodeKey,
    },

    /// The edit would break a tree invariant.
    #[error("tree state violation: {reason}")]
    TreeState {
        /// What was wrong
        reason: String,
    },

    /// Detach was asked for a container that is not the node's parent.
    #[error("node {node} cannot be detached from {container}, which is not its parent")]
    NotParent {
        /// The node being detached
        node: NodeKey,
        /// The container named in the request
        container: NodeKey,
    },

    /// The container does not accept children of this type.
    #[error("{container} nodes cannot hold {child_type} children")]
    IllegalChildType {
        /// Type of the container
        container: NodeType,
        /// Type of the rejected child
        child_type: NodeType,
    },

    /// More than one child was given for a singleton slot.
    #[error("{container} nodes hold at most one {child_type} child")]
    TooManyChildren {
        /// Type of the container
        container: NodeType,
        /// Type of the singleton slot's child
        child_type: NodeType,
    },

    /// Two observations of one program or list share a number.
    #[error("duplicate observation number {number}")]
    DuplicateObservationNumber {
        /// The repeated observation number
        number: i32,
    },

    /// A node with this key already exists in the document.
    #[error("duplicate node key {key}")]
    DuplicateKey {
        /// The repeated key
        key: NodeKey,
    },

    /// A container operation was called on a leaf node.
    #[error("node {node} is not a container")]
    NotAContainer {
        /// The leaf node
        node: NodeKey,
    },

    /// Insert position past the end of a child list.
    #[error("index {index} out of bounds for a list of {len} children")]
    IndexOutOfBounds {
        /// The requested position
        index: usize,
        /// Length of the list
        len: usize,
    },

    /// No node with this key exists in the document.
    #[error("unknown node {key}")]
    UnknownNode {
        /// The missing key
        key: NodeKey,
    },

    /// A reserved client data slot was given a value of the wrong kind.
    #[error("client data slot {name} cannot hold this kind of value")]
    InvalidClientData {
        /// Name of the slot
        name: String,
    },
}

impl NodeError {
    /// Check if this error is a cross-document attach.
    pub fn is_not_local(&self) -> bool {
        matches!(self, NodeError::NotLocal { .. })
    }

    /// Check if this error is a tree-shape violation.
    pub fn is_tree_state(&self) -> bool {
        matches!(
            self,
            NodeError::TreeState { .. }
                | NodeError::IllegalChildType { .. }
                | NodeError::TooManyChildren { .. }
                | NodeError::DuplicateObservationNumber { .. }
        )
    }

    /// Check if this error is a misuse of the API by the caller.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            NodeError::NotParent { .. }
                | NodeError::NotAContainer { .. }
                | NodeError::IndexOutOfBounds { .. }
                | NodeError::InvalidClientData { .. }
        )
    }

    /// Check if this error indicates a node was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NodeError::UnknownNode { .. })
    }

    /// Get the key of the node the error is about, if any.
    pub fn node_key(&self) -> Option<&NodeKey> {
        match self {
            NodeError::NotLocal { node, .. }
            | NodeError::NotParent { node, .. }
            | NodeError::NotAContainer { node } => Some(node),
            NodeError::DuplicateKey { key } | NodeError::UnknownNode { key } => Some(key),
            _ => None,
        }
    }
}

impl From<NodeError> for crate::Error {
    fn from(err: NodeError) -> Self {
        crate::Error::Node(err)
    }
}
