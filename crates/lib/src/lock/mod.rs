//! Per-document reentrant read/write locking.
//!
//! Every node of a document is guarded by one [`ProgramLock`], handed out by
//! a [`LockRegistry`] keyed on the document key. The lock is reentrant for the
//! owning thread:
//!
//! * a writer may take the write lock again, and may take read locks;
//! * a reader may take more read locks;
//! * a reader asking for the write lock gets [`LockError::UpgradeNotSupported`].
//!
//! Once a writer is waiting, new readers queue behind it so a stream of
//! readers cannot starve writers. Threads that already hold a read lock are
//! still let through, otherwise a reentrant read would deadlock against the
//! waiting writer.
//!
//! Guards release on drop and are `!Send`: a lock taken on one thread must be
//! released on the same thread.
//!
//! Public API operations that touch several values should declare a locking
//! operation with [`ProgramLock::read_operation`] or
//! [`ProgramLock::write_operation`]. Fine-grained accessors that lock on
//! their own outside such an operation are reported at `trace` level when
//! implicit-lock diagnostics are enabled.

mod errors;

pub use errors::LockError;

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::{self, ThreadId};

use crate::keys::NodeKey;

thread_local! {
    static OPERATION_DEPTH: Cell<usize> = const { Cell::new(0) };
}

fn enter_operation() {
    OPERATION_DEPTH.with(|d| d.set(d.get() + 1));
}

fn exit_operation() {
    OPERATION_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
}

/// `true` when the current thread is inside a declared locking operation.
pub fn in_locking_operation() -> bool {
    OPERATION_DEPTH.with(|d| d.get() > 0)
}

#[derive(Debug, Default)]
struct LockState {
    writer: Option<ThreadId>,
    write_count: usize,
    /// Read locks taken by the writer while it held the write lock.
    writer_reads: usize,
    readers: HashMap<ThreadId, usize>,
    waiting_writers: usize,
}

/// Reentrant read/write lock shared by all nodes of one document.
#[derive(Debug)]
pub struct ProgramLock {
    key: NodeKey,
    state: Mutex<LockState>,
    cond: Condvar,
    diagnostics: bool,
}

impl ProgramLock {
    pub fn new(key: NodeKey) -> Self {
        Self::with_diagnostics(key, false)
    }

    pub fn with_diagnostics(key: NodeKey, diagnostics: bool) -> Self {
        Self {
            key,
            state: Mutex::new(LockState::default()),
            cond: Condvar::new(),
            diagnostics,
        }
    }

    /// Key of the document this lock guards.
    pub fn key(&self) -> NodeKey {
        self.key
    }

    /// Acquires a read lock, blocking while another thread writes or waits to.
    pub fn read(&self) -> ReadGuard<'_> {
        self.acquire_read();
        ReadGuard {
            lock: self,
            operation: false,
            _not_send: PhantomData,
        }
    }

    /// Acquires the write lock, blocking until all other holders release.
    pub fn write(&self) -> Result<WriteGuard<'_>, LockError> {
        self.acquire_write()?;
        Ok(WriteGuard {
            lock: self,
            operation: false,
            _not_send: PhantomData,
        })
    }

    /// Acquires a read lock and declares a locking operation for its scope.
    pub fn read_operation(&self) -> ReadGuard<'_> {
        let mut guard = self.read();
        enter_operation();
        guard.operation = true;
        guard
    }

    /// Acquires the write lock and declares a locking operation for its scope.
    pub fn write_operation(&self) -> Result<WriteGuard<'_>, LockError> {
        let mut guard = self.write()?;
        enter_operation();
        guard.operation = true;
        Ok(guard)
    }

    /// Read lock taken by a fine-grained accessor named `accessor`.
    pub(crate) fn read_internal(&self, accessor: &'static str) -> ReadGuard<'_> {
        self.report_implicit("read", accessor);
        self.read()
    }

    /// Write lock taken by a fine-grained accessor named `accessor`.
    pub(crate) fn write_internal(
        &self,
        accessor: &'static str,
    ) -> Result<WriteGuard<'_>, LockError> {
        self.report_implicit("write", accessor);
        self.write()
    }

    fn report_implicit(&self, mode: &'static str, accessor: &'static str) {
        if self.diagnostics && !in_locking_operation() {
            tracing::trace!(
                lock = %self.key,
                mode,
                accessor,
                "implicit lock outside a locking operation"
            );
        }
    }

    /// `true` if the current thread holds the write lock.
    pub fn have_write_lock(&self) -> bool {
        let me = thread::current().id();
        self.lock_state().writer == Some(me)
    }

    /// `true` if the current thread holds read or write access.
    pub fn has_read_lock(&self) -> bool {
        let me = thread::current().id();
        let state = self.lock_state();
        state.writer == Some(me) || state.readers.contains_key(&me)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire_read(&self) {
        let me = thread::current().id();
        let mut state = self.lock_state();
        loop {
            if state.writer == Some(me) {
                state.writer_reads += 1;
                return;
            }
            if let Some(count) = state.readers.get_mut(&me) {
                *count += 1;
                return;
            }
            if state.writer.is_none() && state.waiting_writers == 0 {
                state.readers.insert(me, 1);
                return;
            }
            tracing::trace!(lock = %self.key, "waiting for read lock");
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn release_read(&self) {
        let me = thread::current().id();
        let mut state = self.lock_state();
        if state.writer == Some(me) && state.writer_reads > 0 {
            state.writer_reads -= 1;
        } else if let Some(count) = state.readers.get_mut(&me) {
            *count -= 1;
            if *count == 0 {
                state.readers.remove(&me);
            }
        }
        self.cond.notify_all();
    }

    fn acquire_write(&self) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut state = self.lock_state();
        if state.writer == Some(me) {
            state.write_count += 1;
            return Ok(());
        }
        if state.readers.contains_key(&me) {
            return Err(LockError::UpgradeNotSupported);
        }
        state.waiting_writers += 1;
        while state.writer.is_some() || !state.readers.is_empty() {
            tracing::trace!(lock = %self.key, "waiting for write lock");
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.waiting_writers -= 1;
        state.writer = Some(me);
        state.write_count = 1;
        Ok(())
    }

    fn release_write(&self) {
        let me = thread::current().id();
        let mut state = self.lock_state();
        if state.writer != Some(me) {
            return;
        }
        state.write_count -= 1;
        if state.write_count == 0 {
            state.writer = None;
            // Reads taken under the write lock outlive it as plain reads.
            if state.writer_reads > 0 {
                let reads = std::mem::take(&mut state.writer_reads);
                state.readers.insert(me, reads);
            }
        }
        self.cond.notify_all();
    }
}

/// Scoped read access to a [`ProgramLock`].
#[must_use = "the lock is released when the guard is dropped"]
pub struct ReadGuard<'a> {
    lock: &'a ProgramLock,
    operation: bool,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        if self.operation {
            exit_operation();
        }
        self.lock.release_read();
    }
}

impl fmt::Debug for ReadGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadGuard")
            .field("lock", &self.lock.key)
            .field("operation", &self.operation)
            .finish()
    }
}

/// Scoped write access to a [`ProgramLock`].
#[must_use = "the lock is released when the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a ProgramLock,
    operation: bool,
    _not_send: PhantomData<*const ()>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if self.operation {
            exit_operation();
        }
        self.lock.release_write();
    }
}

impl fmt::Debug for WriteGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteGuard")
            .field("lock", &self.lock.key)
            .field("operation", &self.operation)
            .finish()
    }
}

/// Hands out one [`ProgramLock`] per document key.
///
/// Concurrent first requests for the same key always receive the same lock.
/// Documents copied with their key preserved therefore share a lock with the
/// original.
///
/// The registry holds its locks weakly: once every document using a lock is
/// dropped, the entry is pruned on the next request for a new lock.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<NodeKey, Weak<ProgramLock>>>,
    diagnostics: bool,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose locks report implicit locking at `trace` level.
    pub fn with_diagnostics(diagnostics: bool) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            diagnostics,
        }
    }

    /// Returns the lock for `key`, creating it if no live document holds one.
    pub fn lock_for(&self, key: NodeKey) -> Arc<ProgramLock> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(&key).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(ProgramLock::with_diagnostics(key, self.diagnostics));
        locks.insert(key, Arc::downgrade(&lock));
        lock
    }

    /// Forgets the lock for `key`. Documents already holding it keep it.
    pub fn release(&self, key: &NodeKey) -> bool {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(key).is_some()
    }

    /// Number of locks still held by some document.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
