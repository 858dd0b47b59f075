//! Error types for storing and loading documents.

use thiserror::Error;

/// Errors raised by the [`Serializer`](super::Serializer) and the
/// [`TypeResolver`](crate::TypeResolver).
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The document could not be written.
    #[error("failed to store document: {reason}")]
    StoreFailed {
        /// What went wrong
        reason: String,
    },

    /// The byte stream could not be turned back into a document. Nothing is
    /// returned from a failed load.
    #[error("failed to load document: {reason}")]
    LoadFailed {
        /// What went wrong
        reason: String,
    },

    /// The stream was written by an incompatible format version.
    #[error("unsupported document format version {version}")]
    UnsupportedFormat {
        /// Version found in the stream
        version: u32,
    },

    /// No decoder is registered for a data object type name.
    #[error("unknown data object type: {name}")]
    UnknownDataObjectType {
        /// The unregistered type name
        name: String,
    },

    /// Reading or writing a document file failed.
    #[error("document file I/O failed")]
    FileIo {
        #[source]
        source: std::io::Error,
    },
}

impl SerializeError {
    /// Check if this error means a stream could not be loaded.
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            SerializeError::LoadFailed { .. }
                | SerializeError::UnsupportedFormat { .. }
                | SerializeError::UnknownDataObjectType { .. }
        )
    }

    /// Check if this error happened while writing.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, SerializeError::StoreFailed { .. })
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        matches!(self, SerializeError::FileIo { .. })
    }
}

impl From<SerializeError> for crate::Error {
    fn from(err: SerializeError) -> Self {
        crate::Error::Serialize(err)
    }
}
