//! Hooks that give new and copied nodes their domain state.

use std::collections::HashMap;
use std::sync::Arc;

use super::Factory;
use crate::Result;
use crate::data_object::ComponentType;
use crate::node::{Node, NodeType};

/// Populates nodes of one kind.
///
/// `init_node` runs after a node is created from scratch and typically sets
/// a default data object. `update_node` runs after a node is copied and
/// recomputes any derived client data.
pub trait NodeInitializer: Send + Sync {
    fn init_node(&self, factory: &Factory, node: &Node) -> Result<()>;

    fn update_node(&self, _node: &Node) -> Result<()> {
        Ok(())
    }
}

/// Initializers by node type, with per-component overrides.
#[derive(Default, Clone)]
pub(crate) struct Initializers {
    by_type: HashMap<NodeType, Arc<dyn NodeInitializer>>,
    obs_components: HashMap<ComponentType, Arc<dyn NodeInitializer>>,
    seq_components: HashMap<ComponentType, Arc<dyn NodeInitializer>>,
}

impl Initializers {
    pub(crate) fn set(&mut self, node_type: NodeType, init: Arc<dyn NodeInitializer>) {
        self.by_type.insert(node_type, init);
    }

    pub(crate) fn set_obs_component(&mut self, ct: ComponentType, init: Arc<dyn NodeInitializer>) {
        self.obs_components.insert(ct, init);
    }

    pub(crate) fn set_seq_component(&mut self, ct: ComponentType, init: Arc<dyn NodeInitializer>) {
        self.seq_components.insert(ct, init);
    }

    /// The initializer for `node`: the component-specific one if registered,
    /// else the one for its type.
    pub(crate) fn for_node(&self, node: &Node) -> Option<Arc<dyn NodeInitializer>> {
        let by_component = match (node.node_type(), node.component_type()) {
            (NodeType::ObsComponent, Some(ct)) => self.obs_components.get(ct),
            (NodeType::SeqComponent, Some(ct)) => self.seq_components.get(ct),
            _ => None,
        };
        by_component
            .or_else(|| self.by_type.get(&node.node_type()))
            .cloned()
    }
}
