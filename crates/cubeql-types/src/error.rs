//! Resolution errors

use cubeql_diagnostics::{
    CQ0100, CQ0101, CQ0102, CQ0103, CQ0104, CQ0105, CQ0106, CQ0107, CQ0108, CQ0109, CubeError,
    ErrorBuilder, ErrorCode,
};
use cubeql_model::ModelError;
use thiserror::Error;

/// Errors raised while typing an expression
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    /// No overload accepts the argument types
    #[error("No function matches signature '{name}({args})' ({syntax})")]
    NoMatchingFunction {
        name: String,
        syntax: String,
        args: String,
    },

    /// Several overloads tie at the lowest conversion cost
    #[error("Ambiguous call to '{name}({args})': {candidates} overloads match equally well")]
    AmbiguousOverload {
        name: String,
        args: String,
        candidates: usize,
    },

    /// A dimension was used where a hierarchy is needed but it has several
    #[error("Dimension '{dimension}' has more than one hierarchy; qualify the hierarchy")]
    MultipleHierarchies { dimension: String },

    #[error("Tuple contains more than one member of hierarchy '{hierarchy}'")]
    DuplicateHierarchy { hierarchy: String },

    #[error("All arguments to function '{function}' must have same hierarchy")]
    MismatchedHierarchies { function: String },

    #[error("Invalid flag '{flag}' for function '{function}'; expected one of {allowed}")]
    InvalidFlag {
        function: String,
        flag: String,
        allowed: String,
    },

    #[error("Unknown named set: {0}")]
    UnknownNamedSet(String),

    #[error("Duplicate definition of '{0}'")]
    DuplicateDefinition(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Invalid argument to '{function}': {message}")]
    InvalidArgument { function: String, message: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Result type for resolution
pub type ResolutionResult<T> = Result<T, ResolutionError>;

impl ResolutionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ResolutionError::NoMatchingFunction { .. } => CQ0100,
            ResolutionError::AmbiguousOverload { .. } => CQ0101,
            ResolutionError::MultipleHierarchies { .. } => CQ0102,
            ResolutionError::DuplicateHierarchy { .. } => CQ0103,
            ResolutionError::MismatchedHierarchies { .. } => CQ0104,
            ResolutionError::InvalidFlag { .. } => CQ0105,
            ResolutionError::UnknownNamedSet(_) => CQ0106,
            ResolutionError::DuplicateDefinition(_) => CQ0107,
            ResolutionError::TypeMismatch { .. } => CQ0108,
            ResolutionError::InvalidArgument { .. } => CQ0109,
            ResolutionError::Model(err) => err.code(),
        }
    }

    pub fn invalid_argument(function: impl Into<String>, message: impl Into<String>) -> Self {
        ResolutionError::InvalidArgument {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Convert to the umbrella error, attaching the offending expression
    pub fn into_cube_error(self, expression: Option<String>) -> CubeError {
        if let ResolutionError::Model(err) = self {
            return err.into();
        }
        let builder = ErrorBuilder::new(self.code(), self.to_string());
        match expression {
            Some(text) => builder.expression(text).resolution(),
            None => builder.resolution(),
        }
    }
}

impl From<ResolutionError> for CubeError {
    fn from(err: ResolutionError) -> Self {
        err.into_cube_error(None)
    }
}
