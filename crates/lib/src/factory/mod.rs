//! Creation of documents and nodes.
//!
//! The [`Factory`] is the only way to make nodes. It stamps each new
//! document with the configured database id, a fresh lifespan and the lock
//! for its key, and runs the registered [`NodeInitializer`] on every node it
//! creates or copies.
//!
//! ```
//! use sptree::{Factory, ProgramId};
//!
//! let factory = Factory::new();
//! let program = factory.create_program(None, Some(ProgramId::from("GS-2024A-Q-1")))?;
//! let obs = factory.create_observation(&program, None, None)?;
//! program.add_observation(&obs)?;
//! assert_eq!(obs.observation_number(), Some(1));
//! assert_eq!(obs.parent(), Some(program));
//! # Ok::<(), sptree::Error>(())
//! ```

mod config;
mod copy;
mod errors;
mod initializer;

pub use config::FactoryConfig;
pub use errors::FactoryError;
pub use initializer::NodeInitializer;

use std::sync::{Arc, PoisonError, RwLock};

use handle_trait::Handle;

use crate::Result;
use crate::clock::{Clock, SystemClock};
use crate::data_object::ComponentType;
use crate::document::Document;
use crate::keys::{DatabaseId, LifespanId, NodeKey, ProgramId};
use crate::lock::LockRegistry;
use crate::node::{Node, NodeCell, NodeType};
use initializer::Initializers;

struct FactoryInner {
    database_id: DatabaseId,
    clock: Arc<dyn Clock>,
    locks: Arc<LockRegistry>,
    initializers: RwLock<Initializers>,
    creatable_obs_components: RwLock<Vec<ComponentType>>,
    creatable_seq_components: RwLock<Vec<ComponentType>>,
}

/// Creates documents and nodes, and copies subtrees between documents.
#[derive(Clone, Handle)]
pub struct Factory {
    inner: Arc<FactoryInner>,
}

impl Factory {
    /// Factory with a default config, the system clock and its own lock
    /// registry.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> FactoryBuilder {
        FactoryBuilder::new()
    }

    pub fn database_id(&self) -> DatabaseId {
        self.inner.database_id
    }

    pub fn lock_registry(&self) -> &Arc<LockRegistry> {
        &self.inner.locks
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    // ---- initializers ----

    /// Registers the initializer for all nodes of `node_type`.
    pub fn register_initializer(&self, node_type: NodeType, init: Arc<dyn NodeInitializer>) {
        self.write_initializers().set(node_type, init);
    }

    /// Registers the initializer for observation components of `ct`.
    pub fn register_obs_component_initializer(
        &self,
        ct: ComponentType,
        init: Arc<dyn NodeInitializer>,
    ) {
        self.write_initializers().set_obs_component(ct, init);
    }

    /// Registers the initializer for sequence components of `ct`.
    pub fn register_seq_component_initializer(
        &self,
        ct: ComponentType,
        init: Arc<dyn NodeInitializer>,
    ) {
        self.write_initializers().set_seq_component(ct, init);
    }

    fn write_initializers(&self) -> std::sync::RwLockWriteGuard<'_, Initializers> {
        self.inner
            .initializers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn initializer_for(&self, node: &Node) -> Option<Arc<dyn NodeInitializer>> {
        self.inner
            .initializers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .for_node(node)
    }

    pub(crate) fn init_node(&self, node: &Node) -> Result<()> {
        match self.initializer_for(node) {
            Some(init) => init.init_node(self, node),
            None => Ok(()),
        }
    }

    pub(crate) fn update_node(&self, node: &Node) -> Result<()> {
        match self.initializer_for(node) {
            Some(init) => init.update_node(node),
            None => Ok(()),
        }
    }

    // ---- creatable component lists ----

    pub fn creatable_obs_components(&self) -> Vec<ComponentType> {
        self.inner
            .creatable_obs_components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_creatable_obs_components(&self, components: Vec<ComponentType>) {
        *self
            .inner
            .creatable_obs_components
            .write()
            .unwrap_or_else(PoisonError::into_inner) = components;
    }

    pub fn creatable_seq_components(&self) -> Vec<ComponentType> {
        self.inner
            .creatable_seq_components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_creatable_seq_components(&self, components: Vec<ComponentType>) {
        *self
            .inner
            .creatable_seq_components
            .write()
            .unwrap_or_else(PoisonError::into_inner) = components;
    }

    // ---- documents ----

    pub(crate) fn new_document(
        &self,
        key: NodeKey,
        program_id: Option<ProgramId>,
        lifespan: LifespanId,
    ) -> Document {
        Document::new(
            key,
            program_id,
            self.inner.database_id,
            lifespan,
            self.inner.locks.lock_for(key),
            Arc::clone(&self.inner.clock),
        )
    }

    fn create_root(
        &self,
        node_type: NodeType,
        key: Option<NodeKey>,
        program_id: Option<ProgramId>,
    ) -> Result<Node> {
        let key = key.unwrap_or_default();
        let doc = self.new_document(key, program_id, LifespanId::random());
        let _lock = doc.write_operation()?;
        let root = doc.insert_cell(Arc::new(NodeCell::new(key, node_type, None, None)))?;
        self.init_node(&root)?;
        tracing::debug!(document = %key, node_type = %node_type, "created document");
        Ok(root)
    }

    /// Creates a new science program document and returns its root.
    pub fn create_program(
        &self,
        key: Option<NodeKey>,
        program_id: Option<ProgramId>,
    ) -> Result<Node> {
        self.create_root(NodeType::Program, key, program_id)
    }

    /// Creates a new nightly record document and returns its root.
    pub fn create_nightly_record(
        &self,
        key: Option<NodeKey>,
        record_id: Option<ProgramId>,
    ) -> Result<Node> {
        self.create_root(NodeType::NightlyRecord, key, record_id)
    }

    fn require_root(root: &Node) -> Result<()> {
        if root.node_type().is_root() {
            Ok(())
        } else {
            Err(FactoryError::NotARoot {
                node: root.key(),
                node_type: root.node_type(),
            }
            .into())
        }
    }

    /// Creates an unattached node in `root`'s document.
    fn create_node(
        &self,
        root: &Node,
        node_type: NodeType,
        component_type: Option<ComponentType>,
        obs_number: Option<i32>,
        key: Option<NodeKey>,
    ) -> Result<Node> {
        Self::require_root(root)?;
        let doc = root.document();
        let _lock = doc.write_operation()?;
        let cell = NodeCell::new(key.unwrap_or_default(), node_type, component_type, obs_number);
        let node = doc.insert_cell(Arc::new(cell))?;
        self.init_node(&node)?;
        tracing::debug!(
            document = %doc.key(),
            node = %node.key(),
            node_type = %node_type,
            "created node"
        );
        Ok(node)
    }

    /// Creates an observation, numbered `number` or, when `None`, with the
    /// next free number of the document.
    pub fn create_observation(
        &self,
        root: &Node,
        number: Option<i32>,
        key: Option<NodeKey>,
    ) -> Result<Node> {
        Self::require_root(root)?;
        let doc = root.document();
        let _lock = doc.write_operation()?;
        let number = match number {
            Some(n) if n < 1 => {
                return Err(FactoryError::InvalidObservationNumber { number: n }.into());
            }
            Some(n) => {
                doc.ensure_observation_number_at_least(n)?;
                n
            }
            None => doc.next_observation_number()?,
        };
        self.create_node(root, NodeType::Observation, None, Some(number), key)
    }

    pub fn create_group(&self, root: &Node, key: Option<NodeKey>) -> Result<Node> {
        self.create_node(root, NodeType::Group, None, None, key)
    }

    pub fn create_obs_component(
        &self,
        root: &Node,
        component_type: ComponentType,
        key: Option<NodeKey>,
    ) -> Result<Node> {
        self.create_node(root, NodeType::ObsComponent, Some(component_type), None, key)
    }

    pub fn create_seq_component(
        &self,
        root: &Node,
        component_type: ComponentType,
        key: Option<NodeKey>,
    ) -> Result<Node> {
        self.create_node(root, NodeType::SeqComponent, Some(component_type), None, key)
    }

    pub fn create_obs_qa_log(&self, root: &Node, key: Option<NodeKey>) -> Result<Node> {
        self.create_node(root, NodeType::ObsQaLog, None, None, key)
    }

    pub fn create_obs_exec_log(&self, root: &Node, key: Option<NodeKey>) -> Result<Node> {
        self.create_node(root, NodeType::ObsExecLog, None, None, key)
    }

    pub fn create_conflict_folder(&self, root: &Node, key: Option<NodeKey>) -> Result<Node> {
        self.create_node(root, NodeType::ConflictFolder, None, None, key)
    }

    pub fn create_template_folder(&self, root: &Node, key: Option<NodeKey>) -> Result<Node> {
        self.create_node(root, NodeType::TemplateFolder, None, None, key)
    }

    pub fn create_template_group(&self, root: &Node, key: Option<NodeKey>) -> Result<Node> {
        self.create_node(root, NodeType::TemplateGroup, None, None, key)
    }

    pub fn create_template_parameters(&self, root: &Node, key: Option<NodeKey>) -> Result<Node> {
        self.create_node(root, NodeType::TemplateParameters, None, None, key)
    }
}

impl Default for Factory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("database_id", &self.inner.database_id)
            .field("clock", &self.inner.clock)
            .finish()
    }
}

/// Builder for [`Factory`].
///
/// ```
/// use std::sync::Arc;
/// use sptree::{Factory, FactoryConfig, LockRegistry, SystemClock};
///
/// let locks = Arc::new(LockRegistry::new());
/// let factory = Factory::builder()
///     .config(FactoryConfig::default())
///     .clock(Arc::new(SystemClock))
///     .lock_registry(locks.clone())
///     .build();
/// factory.create_program(None, None).unwrap();
/// assert_eq!(locks.len(), 1);
/// ```
pub struct FactoryBuilder {
    config: FactoryConfig,
    clock: Option<Arc<dyn Clock>>,
    locks: Option<Arc<LockRegistry>>,
    initializers: Initializers,
}

impl FactoryBuilder {
    pub fn new() -> Self {
        Self {
            config: FactoryConfig::default(),
            clock: None,
            locks: None,
            initializers: Initializers::default(),
        }
    }

    pub fn config(mut self, config: FactoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn database_id(mut self, id: DatabaseId) -> Self {
        self.config.database_id = id;
        self
    }

    pub fn implicit_lock_diagnostics(mut self, enabled: bool) -> Self {
        self.config.implicit_lock_diagnostics = enabled;
        self
    }

    /// Time source for modification stamps. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Registry to take document locks from. Defaults to a fresh registry
    /// honouring the config's diagnostics flag.
    pub fn lock_registry(mut self, locks: Arc<LockRegistry>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn initializer(mut self, node_type: NodeType, init: Arc<dyn NodeInitializer>) -> Self {
        self.initializers.set(node_type, init);
        self
    }

    pub fn build(self) -> Factory {
        let locks = self.locks.unwrap_or_else(|| {
            Arc::new(LockRegistry::with_diagnostics(
                self.config.implicit_lock_diagnostics,
            ))
        });
        Factory {
            inner: Arc::new(FactoryInner {
                database_id: self.config.database_id,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                locks,
                initializers: RwLock::new(self.initializers),
                creatable_obs_components: RwLock::new(self.config.creatable_obs_components),
                creatable_seq_components: RwLock::new(self.config.creatable_seq_components),
            }),
        }
    }
}

impl Default for FactoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
