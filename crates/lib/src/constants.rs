//! Constants used throughout the science program tree.
//!
//! Property names identify what changed in property and structure change
//! events; client data keys name the reserved client data slots.

/// Client data key of the node's primary data object.
pub const DATA_OBJECT_KEY: &str = "DataObject";

/// Client data key of the node's conflict record.
pub const CONFLICTS_KEY: &str = "Conflicts";

/// Prefix of the property name fired when client data changes.
pub const CLIENT_DATA_PROP_PREFIX: &str = "ClientData";

/// Prefix of the property name fired when transient client data changes.
pub const TRANSIENT_CLIENT_DATA_PROP_PREFIX: &str = "TransientClientData";

/// Composite event fired when a node starts sending events again.
pub const EVENTS_ACTIVATED: &str = "EventsActivated";

pub const OBS_COMPONENTS_PROP: &str = "ObsComponents";
pub const OBSERVATIONS_PROP: &str = "Observations";
pub const OBS_GROUP_PROP: &str = "ObsGroup";
pub const SEQ_COMPONENT_PROP: &str = "SeqComponent";
pub const SEQ_COMPONENTS_PROP: &str = "SeqComponents";
pub const CONFLICT_FOLDER_PROP: &str = "ConflictFolder";
pub const TEMPLATE_FOLDER_PROP: &str = "TemplateFolder";
pub const TEMPLATE_GROUP_PROP: &str = "TemplateGroups";
pub const TEMPLATE_PARAMETERS_PROP: &str = "TemplateParameters";
pub const OBS_QA_LOG_PROP: &str = "ObsQaLog";
pub const OBS_EXEC_LOG_PROP: &str = "ObsExecLog";

/// Current version of the serialized document envelope.
pub const SERIAL_FORMAT_VERSION: u32 = 1;

/// Property name fired for a change to the named client data slot.
pub fn client_data_property_name(key: &str) -> String {
    format!("{CLIENT_DATA_PROP_PREFIX}:{key}")
}

/// Property name fired for a change to the named transient client data slot.
pub fn transient_client_data_property_name(key: &str) -> String {
    format!("{TRANSIENT_CLIENT_DATA_PROP_PREFIX}:{key}")
}
