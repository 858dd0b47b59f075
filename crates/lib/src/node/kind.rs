//! The closed set of node kinds and the child slots each container declares.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    Program,
    NightlyRecord,
    Observation,
    Group,
    ObsComponent,
    SeqComponent,
    ObsQaLog,
    ObsExecLog,
    ConflictFolder,
    TemplateFolder,
    TemplateGroup,
    TemplateParameters,
}

/// Whether a slot holds a single child or an ordered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// One typed child collection of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDef {
    /// Property name used in change events for this slot.
    pub property: &'static str,
    pub child_type: NodeType,
    pub cardinality: Cardinality,
}

impl SlotDef {
    const fn one(property: &'static str, child_type: NodeType) -> Self {
        Self {
            property,
            child_type,
            cardinality: Cardinality::One,
        }
    }

    const fn many(property: &'static str, child_type: NodeType) -> Self {
        Self {
            property,
            child_type,
            cardinality: Cardinality::Many,
        }
    }

    pub fn is_singleton(&self) -> bool {
        self.cardinality == Cardinality::One
    }
}

const PROGRAM: &[SlotDef] = &[
    SlotDef::one(CONFLICT_FOLDER_PROP, NodeType::ConflictFolder),
    SlotDef::many(OBS_COMPONENTS_PROP, NodeType::ObsComponent),
    SlotDef::one(TEMPLATE_FOLDER_PROP, NodeType::TemplateFolder),
    SlotDef::many(OBSERVATIONS_PROP, NodeType::Observation),
    SlotDef::many(OBS_GROUP_PROP, NodeType::Group),
];

const NIGHTLY_RECORD: &[SlotDef] = &[
    SlotDef::one(CONFLICT_FOLDER_PROP, NodeType::ConflictFolder),
    SlotDef::many(OBSERVATIONS_PROP, NodeType::Observation),
];

const GROUP: &[SlotDef] = &[
    SlotDef::one(CONFLICT_FOLDER_PROP, NodeType::ConflictFolder),
    SlotDef::many(OBS_COMPONENTS_PROP, NodeType::ObsComponent),
    SlotDef::many(OBSERVATIONS_PROP, NodeType::Observation),
];

const OBSERVATION: &[SlotDef] = &[
    SlotDef::one(CONFLICT_FOLDER_PROP, NodeType::ConflictFolder),
    SlotDef::many(OBS_COMPONENTS_PROP, NodeType::ObsComponent),
    SlotDef::one(OBS_QA_LOG_PROP, NodeType::ObsQaLog),
    SlotDef::one(OBS_EXEC_LOG_PROP, NodeType::ObsExecLog),
    SlotDef::one(SEQ_COMPONENT_PROP, NodeType::SeqComponent),
];

const SEQ_COMPONENT: &[SlotDef] = &[SlotDef::many(SEQ_COMPONENTS_PROP, NodeType::SeqComponent)];

const CONFLICT_FOLDER: &[SlotDef] = &[
    SlotDef::many(OBS_COMPONENTS_PROP, NodeType::ObsComponent),
    SlotDef::many(OBSERVATIONS_PROP, NodeType::Observation),
    SlotDef::many(OBS_GROUP_PROP, NodeType::Group),
    SlotDef::many(SEQ_COMPONENTS_PROP, NodeType::SeqComponent),
    SlotDef::many(OBS_QA_LOG_PROP, NodeType::ObsQaLog),
    SlotDef::many(OBS_EXEC_LOG_PROP, NodeType::ObsExecLog),
    SlotDef::many(TEMPLATE_FOLDER_PROP, NodeType::TemplateFolder),
    SlotDef::many(TEMPLATE_GROUP_PROP, NodeType::TemplateGroup),
    SlotDef::many(TEMPLATE_PARAMETERS_PROP, NodeType::TemplateParameters),
];

const TEMPLATE_FOLDER: &[SlotDef] = &[
    SlotDef::one(CONFLICT_FOLDER_PROP, NodeType::ConflictFolder),
    SlotDef::many(TEMPLATE_GROUP_PROP, NodeType::TemplateGroup),
    SlotDef::many(TEMPLATE_PARAMETERS_PROP, NodeType::TemplateParameters),
];

const TEMPLATE_GROUP: &[SlotDef] = &[
    SlotDef::one(CONFLICT_FOLDER_PROP, NodeType::ConflictFolder),
    SlotDef::many(OBSERVATIONS_PROP, NodeType::Observation),
    SlotDef::many(TEMPLATE_PARAMETERS_PROP, NodeType::TemplateParameters),
    SlotDef::many(OBS_COMPONENTS_PROP, NodeType::ObsComponent),
];

impl NodeType {
    /// Roots are the top node of a document and never have a parent.
    pub fn is_root(self) -> bool {
        matches!(self, NodeType::Program | NodeType::NightlyRecord)
    }

    pub fn is_container(self) -> bool {
        !self.layout().is_empty()
    }

    /// The ordered child slots of this kind; empty for leaves.
    pub fn layout(self) -> &'static [SlotDef] {
        match self {
            NodeType::Program => PROGRAM,
            NodeType::NightlyRecord => NIGHTLY_RECORD,
            NodeType::Group => GROUP,
            NodeType::Observation => OBSERVATION,
            NodeType::SeqComponent => SEQ_COMPONENT,
            NodeType::ConflictFolder => CONFLICT_FOLDER,
            NodeType::TemplateFolder => TEMPLATE_FOLDER,
            NodeType::TemplateGroup => TEMPLATE_GROUP,
            NodeType::ObsComponent
            | NodeType::ObsQaLog
            | NodeType::ObsExecLog
            | NodeType::TemplateParameters => &[],
        }
    }

    /// Index of the slot accepting `child` children.
    pub fn slot_for(self, child: NodeType) -> Option<usize> {
        self.layout().iter().position(|s| s.child_type == child)
    }

    pub fn accepts(self, child: NodeType) -> bool {
        self.slot_for(child).is_some()
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeType::Program => "Program",
            NodeType::NightlyRecord => "NightlyRecord",
            NodeType::Observation => "Observation",
            NodeType::Group => "Group",
            NodeType::ObsComponent => "ObsComponent",
            NodeType::SeqComponent => "SeqComponent",
            NodeType::ObsQaLog => "ObsQaLog",
            NodeType::ObsExecLog => "ObsExecLog",
            NodeType::ConflictFolder => "ConflictFolder",
            NodeType::TemplateFolder => "TemplateFolder",
            NodeType::TemplateGroup => "TemplateGroup",
            NodeType::TemplateParameters => "TemplateParameters",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
