//! Evaluation errors
//!
//! Three tiers reach the caller: resolution errors never get here (they are
//! raised by `cubeql-types` before compilation), evaluation errors attach to
//! the cell being computed, and interruptions (cancellation, timeout) abort
//! the whole query. [`EvalError::is_interruption`] tells the last tier apart.

use cubeql_diagnostics::{
    CQ0200, CQ0201, CQ0202, CQ0203, CQ0204, CQ0205, CQ0206, CQ0207, CQ0208, CQ0209, CQ0210,
    CubeError, ErrorBuilder, ErrorCode,
};
use cubeql_model::ModelError;
use thiserror::Error;

/// Result type for evaluation operations
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors that can occur while evaluating a compiled unit
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    /// Two member or level arguments belong to different hierarchies
    #[error("{function}: dimensions do not match ({message})")]
    HierarchyMismatch { function: String, message: String },

    /// A crossjoin whose inputs share a hierarchy
    #[error("{function}: hierarchy '{hierarchy}' appears in more than one input")]
    DuplicateHierarchy { function: String, hierarchy: String },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// A user function reported a failure
    #[error("User function '{name}' failed: {message}")]
    UserFunction { name: String, message: String },

    #[error("Recursion limit of {limit} exceeded while evaluating '{member}'")]
    RecursionLimit { member: String, limit: usize },

    #[error("Evaluation cancelled")]
    Cancelled,

    #[error("Evaluation timed out after {elapsed_ms} ms (limit {limit_ms} ms)")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    #[error("Invalid argument to {function}: {message}")]
    InvalidArgument { function: String, message: String },

    /// The measure's aggregator cannot be rolled up from partial values
    #[error("Cannot aggregate measure '{measure}' with {aggregator}")]
    AggregationNotSupported { measure: String, aggregator: String },

    #[error("Cell read failed: {0}")]
    CellRead(String),

    #[error(transparent)]
    Model(ModelError),

    #[error("Internal evaluation error: {message}")]
    Internal { message: String },
}

impl EvalError {
    pub fn hierarchy_mismatch(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HierarchyMismatch {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn invalid_argument(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn user_function(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UserFunction {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Cancellation and timeout abort a query instead of attaching to a cell
    pub fn is_interruption(&self) -> bool {
        matches!(self, EvalError::Cancelled | EvalError::Timeout { .. })
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EvalError::HierarchyMismatch { .. } => CQ0201,
            EvalError::DuplicateHierarchy { .. } => CQ0202,
            EvalError::TypeMismatch { .. } => CQ0203,
            EvalError::UserFunction { .. } => CQ0204,
            EvalError::RecursionLimit { .. } => CQ0205,
            EvalError::Cancelled => CQ0206,
            EvalError::Timeout { .. } => CQ0207,
            EvalError::InvalidArgument { .. } => CQ0208,
            EvalError::AggregationNotSupported { .. } => CQ0209,
            EvalError::CellRead(_) => CQ0210,
            EvalError::Model(err) => err.code(),
            EvalError::Internal { .. } => CQ0200,
        }
    }

    /// Convert to the umbrella error, attaching the evaluated expression
    pub fn into_cube_error(self, expression: Option<String>) -> CubeError {
        if let EvalError::Model(err) = self {
            return err.into();
        }
        let builder = ErrorBuilder::new(self.code(), self.to_string());
        match expression {
            Some(text) => builder.expression(text).evaluation(),
            None => builder.evaluation(),
        }
    }
}

impl From<ModelError> for EvalError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::CellRead(message) => EvalError::CellRead(message),
            other => EvalError::Model(other),
        }
    }
}

impl From<EvalError> for CubeError {
    fn from(err: EvalError) -> Self {
        err.into_cube_error(None)
    }
}
