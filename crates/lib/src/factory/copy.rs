//! Deep copies of subtrees and whole documents.

use super::{Factory, FactoryError};
use crate::Result;
use crate::keys::{LifespanId, NodeKey, ProgramId};
use crate::node::Node;
use crate::node::snapshot::{NodeSnapshot, build_subtree};

/// How a whole-document copy treats identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Identity {
    /// Same keys, same lifespan.
    Same,
    /// Same keys, fresh lifespan.
    NewLifespan,
    /// Fresh keys everywhere and renumbered observations.
    NewKeys,
}

impl Factory {
    /// Deep copies `source` into `root`'s document and returns the unattached
    /// copy.
    ///
    /// With `preserve_keys` the copy keeps every key and observation number
    /// of the source, which fails with a duplicate key error if the target
    /// already holds one of them. Otherwise every copied node gets a fresh key
    /// and observations take the next free numbers of the target. Each copied
    /// node is passed to its initializer's `update_node`.
    pub fn copy_node(&self, root: &Node, source: &Node, preserve_keys: bool) -> Result<Node> {
        Self::require_root(root)?;
        if source.node_type().is_root() {
            return Err(FactoryError::WrongNodeType {
                expected: "a non-root node".to_string(),
                actual: source.node_type(),
            }
            .into());
        }

        let snapshot = {
            let _lock = source.document().read_operation();
            source.snapshot()
        };

        let doc = root.document();
        let _lock = doc.write_operation()?;
        let copied = snapshot.len();
        let node = build_subtree(doc, snapshot, preserve_keys, &mut |n: &Node| {
            self.update_node(n)
        })?;
        tracing::debug!(
            document = %doc.key(),
            source = %source.key(),
            copy = %node.key(),
            nodes = copied,
            preserve_keys,
            "copied subtree"
        );
        Ok(node)
    }

    /// Exact duplicate of `program` sharing its keys, lifespan and versions.
    ///
    /// The copy shares the original's lock since locks are handed out per
    /// document key.
    pub fn copy_with_same_keys(&self, program: &Node) -> Result<Node> {
        self.copy_document(program, Identity::Same, None)
    }

    /// Duplicate of `program` with the same keys and versions but a fresh
    /// lifespan, so further edits to it are recorded as a separate replica.
    pub fn copy_with_new_lifespan(&self, program: &Node) -> Result<Node> {
        self.copy_document(program, Identity::NewLifespan, None)
    }

    /// Copy of `program` in which every node has a fresh key, renamed to
    /// `program_id`. Observations are renumbered in tree order starting at 1.
    pub fn copy_with_new_keys(
        &self,
        program: &Node,
        program_id: Option<ProgramId>,
    ) -> Result<Node> {
        self.copy_document(program, Identity::NewKeys, Some(program_id))
    }

    /// Copy of a nightly record under a new document key and id. Nodes below
    /// the root keep their keys.
    pub fn rename_nightly_record(
        &self,
        record: &Node,
        new_key: NodeKey,
        record_id: Option<ProgramId>,
    ) -> Result<Node> {
        Self::require_root(record)?;
        let mut snapshot = Self::document_snapshot(record);
        snapshot.key = new_key;

        let doc = self.new_document(new_key, record_id, LifespanId::random());
        let _lock = doc.write_operation()?;
        let root = build_subtree(&doc, snapshot, true, &mut |n: &Node| self.update_node(n))?;
        tracing::debug!(source = %record.key(), document = %new_key, "renamed nightly record");
        Ok(root)
    }

    fn document_snapshot(root: &Node) -> NodeSnapshot {
        let _lock = root.document().read_operation();
        root.snapshot()
    }

    fn copy_document(
        &self,
        source: &Node,
        identity: Identity,
        new_id: Option<Option<ProgramId>>,
    ) -> Result<Node> {
        Self::require_root(source)?;
        let src = source.document();

        let (snapshot, versions, client_data, last_modified) = {
            let _lock = src.read_operation();
            (
                source.snapshot(),
                src.versions(),
                src.all_client_data(),
                src.last_modified(),
            )
        };

        let (key, lifespan) = match identity {
            Identity::Same => (src.key(), src.lifespan_id()),
            Identity::NewLifespan => (src.key(), LifespanId::random()),
            Identity::NewKeys => (NodeKey::new(), LifespanId::random()),
        };
        let program_id = new_id.unwrap_or_else(|| src.program_id().cloned());

        let doc = self.new_document(key, program_id, lifespan);
        let _lock = doc.write_operation()?;
        let preserve_keys = identity != Identity::NewKeys;
        let root = build_subtree(&doc, snapshot, preserve_keys, &mut |n: &Node| {
            self.update_node(n)
        })?;

        if preserve_keys {
            doc.set_versions(versions)?;
            doc.set_last_modified(last_modified)?;
        }
        for (name, value) in client_data {
            doc.put_client_data(name, value)?;
        }

        tracing::debug!(
            source = %src.key(),
            document = %key,
            ?identity,
            nodes = doc.node_count(),
            "copied document"
        );
        Ok(root)
    }
}
