//! Typed child collections.
//!
//! Every container kind declares an ordered list of slots (see
//! [`NodeType::layout`]). All edits funnel through `update_children`, which
//! reconciles one slot to a new ordered list: new children are attached
//! first and vanished children extracted second, so a failed attach leaves
//! the slot untouched. A pure reorder still marks the container modified.
//!
//! Edits are validated up front: child types must fit the slot, singleton
//! slots take at most one child, children must belong to this document, must
//! not hang under another container and must not be the container or one of
//! its ancestors. Observation numbers must stay unique.

use std::collections::{HashMap, HashSet};

use super::events::EventValue;
use super::{Node, NodeError, NodeType, SlotDef};
use crate::Result;
use crate::keys::NodeKey;

/// Children split by slot, in layout order.
struct TypedChildren {
    buckets: Vec<Vec<Node>>,
}

impl TypedChildren {
    fn classify(container: NodeType, children: Vec<Node>) -> Result<Self> {
        let mut buckets = vec![Vec::new(); container.layout().len()];
        for child in children {
            let slot = container
                .slot_for(child.node_type())
                .ok_or(NodeError::IllegalChildType {
                    container,
                    child_type: child.node_type(),
                })?;
            buckets[slot].push(child);
        }
        Ok(Self { buckets })
    }
}

impl Node {
    fn slot_index(&self, child_type: NodeType) -> Result<usize> {
        if !self.is_container() {
            return Err(NodeError::NotAContainer { node: self.key() }.into());
        }
        Ok(self
            .node_type()
            .slot_for(child_type)
            .ok_or(NodeError::IllegalChildType {
                container: self.node_type(),
                child_type,
            })?)
    }

    fn slot_def(&self, slot: usize) -> SlotDef {
        self.node_type().layout()[slot]
    }

    pub(crate) fn slot_keys(&self, slot: usize) -> Vec<NodeKey> {
        self.cell
            .record()
            .slots
            .get(slot)
            .cloned()
            .unwrap_or_default()
    }

    fn slot_nodes(&self, slot: usize) -> Vec<Node> {
        self.slot_keys(slot)
            .iter()
            .filter_map(|key| self.doc.node(key))
            .collect()
    }

    /// Children of one type, in order.
    pub fn children_of_type(&self, child_type: NodeType) -> Vec<Node> {
        let _lock = self.read_lock("children_of_type");
        match self.node_type().slot_for(child_type) {
            Some(slot) => self.slot_nodes(slot),
            None => Vec::new(),
        }
    }

    fn single_child(&self, child_type: NodeType) -> Option<Node> {
        self.children_of_type(child_type).into_iter().next()
    }

    /// Checks that `children` may become the contents of `slot`.
    fn validate_slot(&self, slot: usize, children: &[Node]) -> Result<()> {
        let def = self.slot_def(slot);
        if def.is_singleton() && children.len() > 1 {
            return Err(NodeError::TooManyChildren {
                container: self.node_type(),
                child_type: def.child_type,
            }
            .into());
        }
        let mut seen = HashSet::new();
        for child in children {
            if child.node_type() != def.child_type {
                return Err(NodeError::IllegalChildType {
                    container: self.node_type(),
                    child_type: child.node_type(),
                }
                .into());
            }
            if !self.doc.same_document(&child.doc) {
                return Err(NodeError::NotLocal {
                    node: child.key(),
                    container: self.key(),
                }
                .into());
            }
            if !seen.insert(child.key()) {
                return Err(NodeError::TreeState {
                    reason: format!("node {} appears twice in the child list", child.key()),
                }
                .into());
            }
            if self.is_self_or_ancestor(child.key()) {
                return Err(NodeError::TreeState {
                    reason: format!("node {} cannot contain itself", child.key()),
                }
                .into());
            }
            if let Some(parent) = child.parent_key().filter(|p| *p != self.key()) {
                return Err(NodeError::TreeState {
                    reason: format!("node {} is already attached to {parent}", child.key()),
                }
                .into());
            }
        }
        // Conflict folders park displaced observations whatever their number.
        if def.child_type == NodeType::Observation && self.node_type() != NodeType::ConflictFolder {
            self.validate_observation_numbers(slot, children)?;
        }
        Ok(())
    }

    fn validate_observation_numbers(&self, slot: usize, observations: &[Node]) -> Result<()> {
        let mut numbers = HashSet::new();
        for obs in observations {
            if let Some(number) = obs.observation_number().filter(|n| !numbers.insert(*n)) {
                return Err(NodeError::DuplicateObservationNumber { number }.into());
            }
        }
        // Numbers are unique across the whole program, groups included.
        let owner = if self.node_type().is_root() {
            Some(self.clone())
        } else {
            self.root_ancestor()
        };
        if let Some(owner) = owner {
            let replaced: HashSet<_> = self.slot_keys(slot).into_iter().collect();
            for other in owner.all_observations() {
                if replaced.contains(&other.key()) {
                    continue;
                }
                if let Some(number) = other.observation_number().filter(|n| numbers.contains(n)) {
                    return Err(NodeError::DuplicateObservationNumber { number }.into());
                }
            }
        }
        Ok(())
    }

    /// Attaches each of `children` to this container, undoing the batch if
    /// one attach fails. Requires the write lock.
    pub(crate) fn attach_children(&self, children: &[Node]) -> Result<()> {
        self.require_write_lock("attach_children")?;
        for (i, child) in children.iter().enumerate() {
            if let Err(e) = child.attach_to(self) {
                for attached in &children[..i] {
                    if let Err(undo) = attached.detach_from(self) {
                        tracing::warn!(
                            node = %attached.key(),
                            error = %undo,
                            "could not undo attach"
                        );
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Detaches each of `children` from this container. Requires the write
    /// lock.
    pub(crate) fn extract_children(&self, children: &[Node]) -> Result<()> {
        self.require_write_lock("extract_children")?;
        for child in children {
            child.detach_from(self)?;
        }
        Ok(())
    }

    /// Reconciles `slot` to `new_children` and returns the previous keys.
    fn update_children(&self, slot: usize, new_children: &[Node]) -> Result<Vec<NodeKey>> {
        self.require_write_lock("update_children")?;
        let old_keys = self.slot_keys(slot);
        let new_keys: Vec<NodeKey> = new_children.iter().map(Node::key).collect();

        let to_attach: Vec<Node> = new_children
            .iter()
            .filter(|n| !old_keys.contains(&n.key()))
            .cloned()
            .collect();
        let to_extract: Vec<Node> = old_keys
            .iter()
            .filter(|k| !new_keys.contains(k))
            .filter_map(|k| self.doc.node(k))
            .collect();

        let before = self.local_version();
        self.attach_children(&to_attach)?;
        self.extract_children(&to_extract)?;
        if before == self.local_version() && old_keys != new_keys {
            // pure reorder
            self.mark_modified()?;
        }
        self.cell.record_mut().slots[slot] = new_keys;
        Ok(old_keys)
    }

    /// Validates, applies and announces a new list for `slot`.
    fn replace_slot(&self, slot: usize, children: Vec<Node>) -> Result<()> {
        self.validate_slot(slot, &children)?;
        let old = self.update_children(slot, &children)?;
        let new: Vec<NodeKey> = children.iter().map(Node::key).collect();
        if old != new {
            let property = self.slot_def(slot).property;
            self.fire_property_change(
                property,
                EventValue::Children(old.clone()),
                EventValue::Children(new.clone()),
            );
            self.fire_structure_change(property, old, new);
        }
        Ok(())
    }

    /// Replaces all children of this container.
    ///
    /// The list is split by type into the container's slots. Every slot is
    /// validated before any is changed.
    pub fn set_children(&self, children: Vec<Node>) -> Result<()> {
        let _lock = self.write_lock("set_children")?;
        if !self.is_container() {
            return Err(NodeError::NotAContainer { node: self.key() }.into());
        }
        let typed = TypedChildren::classify(self.node_type(), children)?;
        for (slot, bucket) in typed.buckets.iter().enumerate() {
            self.validate_slot(slot, bucket)?;
        }
        for (slot, bucket) in typed.buckets.into_iter().enumerate() {
            self.replace_slot(slot, bucket)?;
        }
        Ok(())
    }

    /// Replaces the children of one type.
    pub fn set_children_of_type(&self, child_type: NodeType, children: Vec<Node>) -> Result<()> {
        let _lock = self.write_lock("set_children_of_type")?;
        let slot = self.slot_index(child_type)?;
        self.replace_slot(slot, children)
    }

    /// Inserts `child` into the slot for its type, at `index` or at the end.
    pub fn add_child_at(&self, child: &Node, index: Option<usize>) -> Result<()> {
        let _lock = self.write_lock("add_child")?;
        let slot = self.slot_index(child.node_type())?;
        let mut children = self.slot_nodes(slot);
        let index = index.unwrap_or(children.len());
        if index > children.len() {
            return Err(NodeError::IndexOutOfBounds {
                index,
                len: children.len(),
            }
            .into());
        }
        children.insert(index, child.clone());
        self.replace_slot(slot, children)
    }

    pub fn add_child(&self, child: &Node) -> Result<()> {
        self.add_child_at(child, None)
    }

    /// Removes `child`; a child that is not present is logged and ignored.
    pub fn remove_child(&self, child: &Node) -> Result<()> {
        let _lock = self.write_lock("remove_child")?;
        let slot = self.slot_index(child.node_type())?;
        let mut children = self.slot_nodes(slot);
        let before = children.len();
        children.retain(|c| c.key() != child.key());
        if children.len() == before {
            tracing::warn!(
                container = %self.key(),
                node = %child.key(),
                "remove of a node that is not a child"
            );
            return Ok(());
        }
        self.replace_slot(slot, children)
    }

    fn check_typed(&self, child_type: NodeType, child: &Node) -> Result<()> {
        if child.node_type() != child_type {
            return Err(NodeError::IllegalChildType {
                container: self.node_type(),
                child_type: child.node_type(),
            }
            .into());
        }
        Ok(())
    }

    fn add_typed(&self, child_type: NodeType, child: &Node, index: Option<usize>) -> Result<()> {
        self.check_typed(child_type, child)?;
        self.add_child_at(child, index)
    }

    fn remove_typed(&self, child_type: NodeType, child: &Node) -> Result<()> {
        self.check_typed(child_type, child)?;
        self.remove_child(child)
    }

    fn set_single(&self, child_type: NodeType, child: Option<Node>) -> Result<()> {
        self.set_children_of_type(child_type, child.into_iter().collect())
    }

    // ---- observations ----

    pub fn observations(&self) -> Vec<Node> {
        self.children_of_type(NodeType::Observation)
    }

    pub fn set_observations(&self, observations: Vec<Node>) -> Result<()> {
        self.set_children_of_type(NodeType::Observation, observations)
    }

    pub fn add_observation(&self, observation: &Node) -> Result<()> {
        self.add_typed(NodeType::Observation, observation, None)
    }

    pub fn add_observation_at(&self, index: usize, observation: &Node) -> Result<()> {
        self.add_typed(NodeType::Observation, observation, Some(index))
    }

    pub fn remove_observation(&self, observation: &Node) -> Result<()> {
        self.remove_typed(NodeType::Observation, observation)
    }

    /// Observations directly in this container and, for roots, in its groups.
    pub fn all_observations(&self) -> Vec<Node> {
        let _lock = self.read_lock("all_observations");
        let mut all = self.observations();
        if self.node_type().is_root() {
            for group in self.groups() {
                all.extend(group.observations());
            }
        }
        all
    }

    /// Gives every observation the number it has in `other`, another copy of
    /// this program. Observations unknown to `other` are renumbered after
    /// `other`'s highest number, keeping their relative order.
    pub fn renumber_observations_to_match(&self, other: &Node) -> Result<()> {
        let known: HashMap<NodeKey, i32> = {
            let _lock = other.read_lock("renumber_observations_to_match");
            other
                .all_observations()
                .iter()
                .filter_map(|obs| obs.observation_number().map(|n| (obs.key(), n)))
                .collect()
        };

        let _lock = self.write_lock("renumber_observations_to_match")?;
        let mut unknown = Vec::new();
        for obs in self.all_observations() {
            match known.get(&obs.key()) {
                Some(number) => obs.set_observation_number(*number)?,
                None => unknown.push(obs),
            }
        }

        let mut max = known.values().copied().max().unwrap_or(0);
        unknown.sort_by_key(|obs| obs.observation_number().unwrap_or(0));
        for obs in unknown {
            let current = obs.observation_number().unwrap_or(0);
            if current > max {
                max = current;
            } else {
                max += 1;
                obs.set_observation_number(max)?;
            }
        }
        self.doc.update_next_observation_number(max)
    }

    // ---- groups ----

    pub fn groups(&self) -> Vec<Node> {
        self.children_of_type(NodeType::Group)
    }

    pub fn set_groups(&self, groups: Vec<Node>) -> Result<()> {
        self.set_children_of_type(NodeType::Group, groups)
    }

    pub fn add_group(&self, group: &Node) -> Result<()> {
        self.add_typed(NodeType::Group, group, None)
    }

    pub fn add_group_at(&self, index: usize, group: &Node) -> Result<()> {
        self.add_typed(NodeType::Group, group, Some(index))
    }

    pub fn remove_group(&self, group: &Node) -> Result<()> {
        self.remove_typed(NodeType::Group, group)
    }

    // ---- observation components ----

    pub fn obs_components(&self) -> Vec<Node> {
        self.children_of_type(NodeType::ObsComponent)
    }

    pub fn set_obs_components(&self, components: Vec<Node>) -> Result<()> {
        self.set_children_of_type(NodeType::ObsComponent, components)
    }

    pub fn add_obs_component(&self, component: &Node) -> Result<()> {
        self.add_typed(NodeType::ObsComponent, component, None)
    }

    pub fn add_obs_component_at(&self, index: usize, component: &Node) -> Result<()> {
        self.add_typed(NodeType::ObsComponent, component, Some(index))
    }

    pub fn remove_obs_component(&self, component: &Node) -> Result<()> {
        self.remove_typed(NodeType::ObsComponent, component)
    }

    // ---- sequence ----

    /// The sequence root of an observation, or the child steps of a
    /// sequence component.
    pub fn seq_components(&self) -> Vec<Node> {
        self.children_of_type(NodeType::SeqComponent)
    }

    pub fn seq_component(&self) -> Option<Node> {
        self.single_child(NodeType::SeqComponent)
    }

    pub fn set_seq_component(&self, component: Option<Node>) -> Result<()> {
        self.set_single(NodeType::SeqComponent, component)
    }

    pub fn set_seq_components(&self, components: Vec<Node>) -> Result<()> {
        self.set_children_of_type(NodeType::SeqComponent, components)
    }

    pub fn add_seq_component(&self, component: &Node) -> Result<()> {
        self.add_typed(NodeType::SeqComponent, component, None)
    }

    pub fn add_seq_component_at(&self, index: usize, component: &Node) -> Result<()> {
        self.add_typed(NodeType::SeqComponent, component, Some(index))
    }

    pub fn remove_seq_component(&self, component: &Node) -> Result<()> {
        self.remove_typed(NodeType::SeqComponent, component)
    }

    // ---- logs ----

    pub fn obs_qa_log(&self) -> Option<Node> {
        self.single_child(NodeType::ObsQaLog)
    }

    pub fn set_obs_qa_log(&self, log: Option<Node>) -> Result<()> {
        self.set_single(NodeType::ObsQaLog, log)
    }

    pub fn obs_exec_log(&self) -> Option<Node> {
        self.single_child(NodeType::ObsExecLog)
    }

    pub fn set_obs_exec_log(&self, log: Option<Node>) -> Result<()> {
        self.set_single(NodeType::ObsExecLog, log)
    }

    // ---- conflict folder ----

    pub fn conflict_folder(&self) -> Option<Node> {
        self.single_child(NodeType::ConflictFolder)
    }

    pub fn set_conflict_folder(&self, folder: Option<Node>) -> Result<()> {
        self.set_single(NodeType::ConflictFolder, folder)
    }

    /// Drops the conflict folder. Failures are logged, never returned.
    pub fn remove_conflict_folder(&self) {
        if let Err(e) = self.set_conflict_folder(None) {
            tracing::warn!(container = %self.key(), error = %e, "could not remove conflict folder");
        }
    }

    // ---- templates ----

    pub fn template_folder(&self) -> Option<Node> {
        self.single_child(NodeType::TemplateFolder)
    }

    pub fn set_template_folder(&self, folder: Option<Node>) -> Result<()> {
        self.set_single(NodeType::TemplateFolder, folder)
    }

    pub fn template_groups(&self) -> Vec<Node> {
        self.children_of_type(NodeType::TemplateGroup)
    }

    pub fn set_template_groups(&self, groups: Vec<Node>) -> Result<()> {
        self.set_children_of_type(NodeType::TemplateGroup, groups)
    }

    pub fn add_template_group(&self, group: &Node) -> Result<()> {
        self.add_typed(NodeType::TemplateGroup, group, None)
    }

    pub fn remove_template_group(&self, group: &Node) -> Result<()> {
        self.remove_typed(NodeType::TemplateGroup, group)
    }

    pub fn template_parameters(&self) -> Vec<Node> {
        self.children_of_type(NodeType::TemplateParameters)
    }

    pub fn set_template_parameters(&self, parameters: Vec<Node>) -> Result<()> {
        self.set_children_of_type(NodeType::TemplateParameters, parameters)
    }

    pub fn add_template_parameters(&self, parameters: &Node) -> Result<()> {
        self.add_typed(NodeType::TemplateParameters, parameters, None)
    }

    pub fn remove_template_parameters(&self, parameters: &Node) -> Result<()> {
        self.remove_typed(NodeType::TemplateParameters, parameters)
    }
}
