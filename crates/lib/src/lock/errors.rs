//! Error types for program locking.

use thiserror::Error;

/// Errors raised by [`ProgramLock`](super::ProgramLock) and by operations that
/// require a particular lock to already be held.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LockError {
    /// A thread holding only read access asked for write access.
    ///
    /// Upgrading would deadlock as soon as two readers tried it at once, so it
    /// is refused outright.
    #[error("cannot upgrade a read lock to a write lock")]
    UpgradeNotSupported,

    /// An operation that must run under the write lock was called without it.
    #[error("write lock not held for {operation}")]
    WriteLockNotHeld {
        /// The operation that was attempted
        operation: String,
    },
}

impl LockError {
    /// Check if this error is a violated locking precondition.
    pub fn is_precondition(&self) -> bool {
        matches!(self, LockError::WriteLockNotHeld { .. })
    }

    /// Check if this error is a refused read-to-write upgrade.
    pub fn is_upgrade(&self) -> bool {
        matches!(self, LockError::UpgradeNotSupported)
    }

    /// Get the operation name if this error is about a missing write lock.
    pub fn operation(&self) -> Option<&str> {
        match self {
            LockError::WriteLockNotHeld { operation } => Some(operation),
            _ => None,
        }
    }
}

impl From<LockError> for crate::Error {
    fn from(err: LockError) -> Self {
        crate::Error::Lock(err)
    }
}
