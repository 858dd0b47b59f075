//! Detached copies of subtrees.
//!
//! Copying between documents happens in two steps: the source subtree is
//! captured into a [`NodeSnapshot`] under the source's read lock, then
//! rebuilt in the target document under the target's write lock. The two
//! locks are never held together, which matters when both documents share a
//! key and therefore a lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::{ClientData, Conflicts, Node, NodeCell, NodeType};
use crate::Result;
use crate::constants::CONFLICTS_KEY;
use crate::data_object::{ComponentType, DataObject};
use crate::document::Document;
use crate::keys::NodeKey;

/// Persistent state of one node and its descendants.
#[derive(Debug, Clone)]
pub(crate) struct NodeSnapshot {
    pub(crate) key: NodeKey,
    pub(crate) node_type: NodeType,
    pub(crate) component_type: Option<ComponentType>,
    pub(crate) obs_number: Option<i32>,
    pub(crate) data_object: Option<Box<dyn DataObject>>,
    pub(crate) conflicts: Option<Conflicts>,
    pub(crate) extensions: BTreeMap<String, Value>,
    /// Children per slot of `node_type`'s layout.
    pub(crate) slots: Vec<Vec<NodeSnapshot>>,
}

impl NodeSnapshot {
    /// Number of nodes in this subtree.
    pub(crate) fn len(&self) -> usize {
        1 + self.slots.iter().flatten().map(NodeSnapshot::len).sum::<usize>()
    }
}

impl Node {
    /// Captures this node and its descendants.
    pub(crate) fn snapshot(&self) -> NodeSnapshot {
        let _lock = self.read_lock("snapshot");
        let (obs_number, data_object, conflicts, extensions, slot_keys) = {
            let record = self.cell.record();
            (
                record.obs_number,
                record.data_object.clone(),
                record.conflicts.clone(),
                record.extensions.clone(),
                record.slots.clone(),
            )
        };
        let slots = slot_keys
            .iter()
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| self.doc.node(key))
                    .map(|child| child.snapshot())
                    .collect()
            })
            .collect();
        NodeSnapshot {
            key: self.key(),
            node_type: self.node_type(),
            component_type: self.cell.component_type.clone(),
            obs_number,
            data_object,
            conflicts,
            extensions,
            slots,
        }
    }
}

/// Rebuilds `snapshot` inside `doc` and returns the new subtree root.
///
/// With `preserve_keys` every node keeps its key and observation number.
/// Otherwise roots take the document key, all other nodes get fresh keys and
/// observations are renumbered from the document's counter. `on_node` runs
/// for each rebuilt node once its children are attached.
///
/// Requires the target document's write lock.
pub(crate) fn build_subtree(
    doc: &Document,
    snapshot: NodeSnapshot,
    preserve_keys: bool,
    on_node: &mut dyn FnMut(&Node) -> Result<()>,
) -> Result<Node> {
    let key = if preserve_keys {
        snapshot.key
    } else if snapshot.node_type.is_root() {
        doc.key()
    } else {
        NodeKey::new()
    };
    let obs_number = match snapshot.obs_number {
        Some(number) if preserve_keys => {
            doc.ensure_observation_number_at_least(number)?;
            Some(number)
        }
        Some(_) => Some(doc.next_observation_number()?),
        None => None,
    };

    let node = doc.insert_cell(Arc::new(NodeCell::new(
        key,
        snapshot.node_type,
        snapshot.component_type,
        obs_number,
    )))?;

    if let Some(data_object) = snapshot.data_object {
        node.set_data_object(data_object)?;
    }
    if let Some(conflicts) = snapshot.conflicts {
        node.put_client_data(CONFLICTS_KEY, ClientData::Conflicts(conflicts))?;
    }
    for (name, value) in snapshot.extensions {
        node.put_client_data(&name, ClientData::Extension(value))?;
    }

    let layout = snapshot.node_type.layout();
    for (slot, children) in snapshot.slots.into_iter().enumerate() {
        if children.is_empty() || slot >= layout.len() {
            continue;
        }
        let mut built = Vec::with_capacity(children.len());
        for child in children {
            built.push(build_subtree(doc, child, preserve_keys, &mut *on_node)?);
        }
        node.set_children_of_type(layout[slot].child_type, built)?;
    }

    on_node(&node)?;
    Ok(node)
}
