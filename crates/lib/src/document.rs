//! State shared by every node of one science program or nightly record.
//!
//! A [`Document`] is a cheap handle to the document's identity, its lock, its
//! version map and the arena holding its nodes. All accessors take the
//! document's [`ProgramLock`] for their duration: readers take the read lock,
//! mutators the write lock.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use handle_trait::Handle;
use serde_json::Value;

use crate::Result;
use crate::clock::{Clock, format_millis};
use crate::keys::{DatabaseId, LifespanId, NodeKey, ProgramId};
use crate::lock::{ProgramLock, ReadGuard, WriteGuard};
use crate::node::{Node, NodeCell, NodeError};
use crate::version::{VersionMap, VersionVector};

/// Mutable per-document values.
#[derive(Debug, Default)]
pub(crate) struct DocumentState {
    versions: VersionMap,
    last_modified: u64,
    client_data: HashMap<String, Value>,
    max_obs_number: i32,
}

struct DocumentInner {
    key: NodeKey,
    program_id: Option<ProgramId>,
    database_id: DatabaseId,
    lifespan: LifespanId,
    lock: Arc<ProgramLock>,
    clock: Arc<dyn Clock>,
    state: RwLock<DocumentState>,
    nodes: RwLock<HashMap<NodeKey, Arc<NodeCell>>>,
}

/// Handle to one document.
///
/// Clones refer to the same document; use [`Document::same_document`] to test
/// identity.
#[derive(Clone, Handle)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl Document {
    pub(crate) fn new(
        key: NodeKey,
        program_id: Option<ProgramId>,
        database_id: DatabaseId,
        lifespan: LifespanId,
        lock: Arc<ProgramLock>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let last_modified = clock.now_millis();
        Self {
            inner: Arc::new(DocumentInner {
                key,
                program_id,
                database_id,
                lifespan,
                lock,
                clock,
                state: RwLock::new(DocumentState {
                    last_modified,
                    ..DocumentState::default()
                }),
                nodes: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Key of the document, equal to the key of its root node.
    pub fn key(&self) -> NodeKey {
        self.inner.key
    }

    /// Human-readable program or nightly record id, if any.
    pub fn program_id(&self) -> Option<&ProgramId> {
        self.inner.program_id.as_ref()
    }

    pub fn database_id(&self) -> DatabaseId {
        self.inner.database_id
    }

    /// Replica identity of this local instantiation of the document.
    pub fn lifespan_id(&self) -> LifespanId {
        self.inner.lifespan
    }

    pub fn lock(&self) -> &Arc<ProgramLock> {
        &self.inner.lock
    }

    /// `true` if both handles refer to the same document.
    pub fn same_document(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Takes the read lock and declares a locking operation.
    pub fn read_operation(&self) -> ReadGuard<'_> {
        self.inner.lock.read_operation()
    }

    /// Takes the write lock and declares a locking operation.
    pub fn write_operation(&self) -> Result<WriteGuard<'_>> {
        Ok(self.inner.lock.write_operation()?)
    }

    fn state(&self) -> RwLockReadGuard<'_, DocumentState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, DocumentState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ---- modification clock ----

    /// Milliseconds since the epoch of the last versioned modification.
    pub fn last_modified(&self) -> u64 {
        let _lock = self.inner.lock.read_internal("last_modified");
        self.state().last_modified
    }

    pub fn last_modified_rfc3339(&self) -> String {
        format_millis(self.last_modified())
    }

    pub(crate) fn set_last_modified(&self, millis: u64) -> Result<()> {
        let _lock = self.inner.lock.write_internal("set_last_modified")?;
        self.state_mut().last_modified = millis;
        Ok(())
    }

    // ---- versions ----

    /// The version `node` would get if it were modified now.
    ///
    /// A node that has never been versioned, has no parent and is not a root
    /// is treated as scratch state and keeps its empty vector.
    pub fn next_version(&self, node: &Node) -> VersionVector {
        let _lock = self.inner.lock.read_internal("next_version");
        let current = self.version_vector_unlocked(&node.key());
        if !current.is_empty() || node.parent_key().is_some() || node.node_type().is_root() {
            current.incr(self.inner.lifespan)
        } else {
            current
        }
    }

    /// Assigns `node` its next version and bumps the modification clock.
    pub fn mark_modified(&self, node: &Node) -> Result<()> {
        let _lock = self.inner.lock.write_internal("mark_modified")?;
        let next = self.next_version(node);
        self.store_version(node.key(), next);
        Ok(())
    }

    /// Forces the version of `key` to `version` and bumps the modification
    /// clock, unless `version` is empty.
    pub fn mark_modified_with(&self, key: NodeKey, version: VersionVector) -> Result<()> {
        let _lock = self.inner.lock.write_internal("mark_modified_with")?;
        self.store_version(key, version);
        Ok(())
    }

    fn store_version(&self, key: NodeKey, version: VersionVector) {
        if version.is_empty() {
            return;
        }
        let now = self.inner.clock.now_millis();
        let mut state = self.state_mut();
        tracing::trace!(node = %key, version = %version, "marking modified");
        state.versions.insert(key, version);
        state.last_modified = now;
    }

    fn version_vector_unlocked(&self, key: &NodeKey) -> VersionVector {
        self.state().versions.get(key).cloned().unwrap_or_default()
    }

    /// Current version of `key`; empty if it was never versioned.
    pub fn version_vector(&self, key: &NodeKey) -> VersionVector {
        let _lock = self.inner.lock.read_internal("version_vector");
        self.version_vector_unlocked(key)
    }

    /// Replaces the version of `key` without touching the modification clock.
    pub fn set_version_vector(&self, key: NodeKey, version: VersionVector) -> Result<()> {
        let _lock = self.inner.lock.write_internal("set_version_vector")?;
        let mut state = self.state_mut();
        if version.is_empty() {
            state.versions.remove(&key);
        } else {
            state.versions.insert(key, version);
        }
        Ok(())
    }

    pub fn contains_version(&self, key: &NodeKey) -> bool {
        let _lock = self.inner.lock.read_internal("contains_version");
        self.state().versions.contains_key(key)
    }

    /// Copy of the whole version map.
    pub fn versions(&self) -> VersionMap {
        let _lock = self.inner.lock.read_internal("versions");
        self.state().versions.clone()
    }

    /// Replaces the whole version map.
    pub fn set_versions(&self, versions: VersionMap) -> Result<()> {
        let _lock = self.inner.lock.write_internal("set_versions")?;
        self.state_mut().versions = versions
            .into_iter()
            .filter(|(_, v)| !v.is_empty())
            .collect();
        Ok(())
    }

    /// This replica's counter in the version of `key`.
    pub fn local_version(&self, key: &NodeKey) -> u32 {
        self.version_vector(key).get(&self.inner.lifespan)
    }

    // ---- document client data ----

    pub fn client_data(&self, name: &str) -> Option<Value> {
        let _lock = self.inner.lock.read_internal("client_data");
        self.state().client_data.get(name).cloned()
    }

    pub fn client_data_keys(&self) -> Vec<String> {
        let _lock = self.inner.lock.read_internal("client_data_keys");
        let mut keys: Vec<_> = self.state().client_data.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn put_client_data(&self, name: impl Into<String>, value: Value) -> Result<()> {
        let _lock = self.inner.lock.write_internal("put_client_data")?;
        self.state_mut().client_data.insert(name.into(), value);
        Ok(())
    }

    pub fn remove_client_data(&self, name: &str) -> Result<Option<Value>> {
        let _lock = self.inner.lock.write_internal("remove_client_data")?;
        Ok(self.state_mut().client_data.remove(name))
    }

    pub(crate) fn all_client_data(&self) -> HashMap<String, Value> {
        let _lock = self.inner.lock.read_internal("all_client_data");
        self.state().client_data.clone()
    }

    // ---- observation numbers ----

    /// Highest observation number handed out in this document.
    pub fn max_observation_number(&self) -> i32 {
        let _lock = self.inner.lock.read_internal("max_observation_number");
        self.state().max_obs_number
    }

    /// Reserves and returns the next free observation number.
    pub fn next_observation_number(&self) -> Result<i32> {
        let _lock = self.inner.lock.write_internal("next_observation_number")?;
        let mut state = self.state_mut();
        state.max_obs_number += 1;
        Ok(state.max_obs_number)
    }

    /// Raises the observation number counter to at least `number`.
    pub fn ensure_observation_number_at_least(&self, number: i32) -> Result<()> {
        let _lock = self
            .inner
            .lock
            .write_internal("ensure_observation_number_at_least")?;
        let mut state = self.state_mut();
        state.max_obs_number = state.max_obs_number.max(number);
        Ok(())
    }

    /// Resets the counter so the next observation gets `max + 1`.
    pub fn update_next_observation_number(&self, max: i32) -> Result<()> {
        let _lock = self
            .inner
            .lock
            .write_internal("update_next_observation_number")?;
        self.state_mut().max_obs_number = max;
        Ok(())
    }

    // ---- node arena ----

    fn nodes(&self) -> RwLockReadGuard<'_, HashMap<NodeKey, Arc<NodeCell>>> {
        self.inner.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert_cell(&self, cell: Arc<NodeCell>) -> Result<Node> {
        let mut nodes = self
            .inner
            .nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if nodes.contains_key(&cell.key) {
            return Err(NodeError::DuplicateKey { key: cell.key }.into());
        }
        nodes.insert(cell.key, Arc::clone(&cell));
        Ok(Node::from_cell(self.handle(), cell))
    }

    /// The root node, once it has been created.
    pub fn root(&self) -> Option<Node> {
        self.node(&self.inner.key)
    }

    /// Any node of this document, attached or not, by key.
    pub fn node(&self, key: &NodeKey) -> Option<Node> {
        self.nodes()
            .get(key)
            .map(|cell| Node::from_cell(self.handle(), Arc::clone(cell)))
    }

    /// Number of nodes in the arena, including detached ones not yet swept.
    pub fn node_count(&self) -> usize {
        self.nodes().len()
    }

    /// Drops nodes that are neither reachable from the root nor from any live
    /// [`Node`] handle. Returns how many were dropped.
    ///
    /// A live node keeps its whole subtree and its ancestors, so a detached
    /// group stays as long as one of its observations is still held.
    /// Versions of dropped nodes stay in the version map.
    pub fn sweep(&self) -> Result<usize> {
        let _lock = self.inner.lock.write_internal("sweep")?;
        let mut nodes = self
            .inner
            .nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let mut live: HashSet<NodeKey> = HashSet::new();
        let mut pending: Vec<NodeKey> = nodes
            .values()
            .filter(|cell| cell.key == self.inner.key || Arc::strong_count(cell) > 1)
            .map(|cell| cell.key)
            .collect();
        while let Some(key) = pending.pop() {
            if !live.insert(key) {
                continue;
            }
            if let Some(cell) = nodes.get(&key) {
                pending.extend(cell.child_keys());
                pending.extend(cell.parent_key());
            }
        }

        let before = nodes.len();
        nodes.retain(|key, _| live.contains(key));
        let dropped = before - nodes.len();
        if dropped > 0 {
            tracing::debug!(document = %self.inner.key, dropped, "swept detached nodes");
        }
        Ok(dropped)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("key", &self.inner.key)
            .field("program_id", &self.inner.program_id)
            .field("lifespan", &self.inner.lifespan)
            .finish()
    }
}
