//! Model errors

use cubeql_diagnostics::{
    CQ0300, CQ0301, CQ0302, CQ0303, CQ0304, CQ0305, CQ0306, CQ0307, CQ0308, CQ0309, CubeError,
    ErrorCode,
};
use thiserror::Error;

/// Errors raised while building a cube or reading cells
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Invalid cube definition: {0}")]
    InvalidDefinition(String),

    #[error("Unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("Unknown hierarchy: {0}")]
    UnknownHierarchy(String),

    #[error("Unknown level '{level}' in hierarchy '{hierarchy}'")]
    UnknownLevel { hierarchy: String, level: String },

    #[error("Unknown member: {0}")]
    UnknownMember(String),

    #[error("Unknown measure: {0}")]
    UnknownMeasure(String),

    #[error("Member '{member}' refers to unknown parent '{parent}'")]
    InvalidParent { member: String, parent: String },

    #[error("Cycle in parent-child hierarchy '{hierarchy}' involving '{member}'")]
    ParentCycle { hierarchy: String, member: String },

    #[error("Cell read failed: {0}")]
    CellRead(String),

    #[error("Failed to load cube definition: {0}")]
    Load(String),
}

impl ModelError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ModelError::InvalidDefinition(_) => CQ0300,
            ModelError::UnknownDimension(_) => CQ0301,
            ModelError::UnknownHierarchy(_) => CQ0302,
            ModelError::UnknownLevel { .. } => CQ0303,
            ModelError::UnknownMember(_) => CQ0304,
            ModelError::UnknownMeasure(_) => CQ0305,
            ModelError::InvalidParent { .. } => CQ0306,
            ModelError::ParentCycle { .. } => CQ0307,
            ModelError::CellRead(_) => CQ0308,
            ModelError::Load(_) => CQ0309,
        }
    }
}

impl From<ModelError> for CubeError {
    fn from(err: ModelError) -> Self {
        CubeError::model(err.code(), err.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Load(err.to_string())
    }
}
