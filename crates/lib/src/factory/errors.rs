//! Error types for node creation and copying.

use thiserror::Error;

use crate::keys::NodeKey;
use crate::node::NodeType;

/// Errors raised by the [`Factory`](super::Factory).
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FactoryError {
    /// Nodes are created inside a program or nightly record, named by its root.
    #[error("node {node} ({node_type}) is not the root of a document")]
    NotARoot {
        /// The node passed in place of a root
        node: NodeKey,
        /// Its type
        node_type: NodeType,
    },

    /// The node passed in is of the wrong kind for the operation.
    #[error("expected {expected}, got {actual}")]
    WrongNodeType {
        /// What the operation accepts
        expected: String,
        /// The type that was passed
        actual: NodeType,
    },

    /// Observation numbers start at 1.
    #[error("invalid observation number {number}")]
    InvalidObservationNumber {
        /// The rejected number
        number: i32,
    },
}

impl FactoryError {
    /// Check if this error is a misuse of the factory API.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            FactoryError::NotARoot { .. } | FactoryError::WrongNodeType { .. }
        )
    }

    /// Check if this error is a rejected argument value.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, FactoryError::InvalidObservationNumber { .. })
    }
}

impl From<FactoryError> for crate::Error {
    fn from(err: FactoryError) -> Self {
        crate::Error::Factory(err)
    }
}
