//! Factory configuration.

use serde::{Deserialize, Serialize};

use crate::data_object::ComponentType;
use crate::keys::DatabaseId;

/// Settings a [`Factory`](super::Factory) is built from.
///
/// Every field has a default, so a partial JSON document is a valid config:
///
/// ```
/// use sptree::FactoryConfig;
///
/// let config: FactoryConfig =
///     serde_json::from_str(r#"{ "implicit_lock_diagnostics": true }"#).unwrap();
/// assert!(config.implicit_lock_diagnostics);
/// assert!(config.creatable_obs_components.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FactoryConfig {
    /// Storage UUID stamped on every document the factory creates.
    pub database_id: DatabaseId,

    /// Log locks taken outside a declared locking operation at `trace` level.
    pub implicit_lock_diagnostics: bool,

    /// Observation component types offered to users.
    pub creatable_obs_components: Vec<ComponentType>,

    /// Sequence component types offered to users.
    pub creatable_seq_components: Vec<ComponentType>,
}
