//! cubeql error types

use crate::ErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Error - compilation or evaluation cannot proceed
    Error,
    /// Warning - potential issue but can continue
    Warning,
    /// Information - informational message
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A diagnostic message with the expression it concerns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level
    pub severity: Severity,
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Rendered expression the message concerns
    pub expression: Option<String>,
    /// Additional context or help
    pub help: Option<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            expression: None,
            help: None,
        }
    }

    /// Create a new warning diagnostic
    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            expression: None,
            help: None,
        }
    }

    /// Set the expression text
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// Set help text
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Render the diagnostic for a terminal, one line per part
    #[cfg(feature = "colored")]
    pub fn render(&self) -> String {
        use colored::Colorize;

        let severity = match self.severity {
            Severity::Error => self.severity.to_string().red().bold(),
            Severity::Warning => self.severity.to_string().yellow().bold(),
            Severity::Info => self.severity.to_string().blue().bold(),
        };
        let mut out = format!("{}[{}]: {}", severity, self.code, self.message.bold());
        if let Some(expr) = &self.expression {
            out.push_str(&format!("\n  {} {}", "-->".blue(), expr));
        }
        if let Some(help) = self.help.as_deref().or(self.code.info().help) {
            out.push_str(&format!("\n  {}: {}", "help".cyan(), help));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} - {}", self.severity, self.code, self.message)?;
        if let Some(expr) = &self.expression {
            write!(f, " in {}", expr)?;
        }
        Ok(())
    }
}

/// Umbrella cubeql error type
///
/// Every crate-level error converts into this type so callers of the
/// facade only have to deal with one error enum.
#[derive(Debug, Clone, Error)]
pub enum CubeError {
    /// Resolution error (overloads, typing, static set checks)
    #[error("{code}: {message}")]
    Resolution {
        code: ErrorCode,
        message: String,
        expression: Option<String>,
        context: Option<String>,
    },

    /// Evaluation error, including cancellation and timeout
    #[error("{code}: {message}")]
    Evaluation {
        code: ErrorCode,
        message: String,
        expression: Option<String>,
        context: Option<String>,
    },

    /// Model error
    #[error("{code}: {message}")]
    Model {
        code: ErrorCode,
        message: String,
        context: Option<String>,
    },

    /// System error
    #[error("{code}: {message}")]
    System {
        code: ErrorCode,
        message: String,
        context: Option<String>,
    },
}

impl CubeError {
    /// Create a resolution error
    pub fn resolution(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Resolution {
            code,
            message: message.into(),
            expression: None,
            context: None,
        }
    }

    /// Create an evaluation error
    pub fn evaluation(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Evaluation {
            code,
            message: message.into(),
            expression: None,
            context: None,
        }
    }

    /// Create a model error
    pub fn model(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Model {
            code,
            message: message.into(),
            context: None,
        }
    }

    /// Create a system error
    pub fn system(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::System {
            code,
            message: message.into(),
            context: None,
        }
    }

    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Resolution { code, .. } => *code,
            Self::Evaluation { code, .. } => *code,
            Self::Model { code, .. } => *code,
            Self::System { code, .. } => *code,
        }
    }

    /// Get the error message without its code
    pub fn message(&self) -> &str {
        match self {
            Self::Resolution { message, .. }
            | Self::Evaluation { message, .. }
            | Self::Model { message, .. }
            | Self::System { message, .. } => message,
        }
    }

    /// Whether the error is a cancellation or timeout
    pub fn is_interruption(&self) -> bool {
        self.code().is_interruption()
    }

    /// Convert to a diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Resolution {
                code,
                message,
                expression,
                context,
            }
            | Self::Evaluation {
                code,
                message,
                expression,
                context,
            } => {
                let mut diag = Diagnostic::error(*code, message.clone());
                if let Some(expr) = expression {
                    diag = diag.with_expression(expr.clone());
                }
                if let Some(ctx) = context {
                    diag = diag.with_help(ctx.clone());
                }
                diag
            }
            Self::Model {
                code,
                message,
                context,
            }
            | Self::System {
                code,
                message,
                context,
            } => {
                let mut diag = Diagnostic::error(*code, message.clone());
                if let Some(ctx) = context {
                    diag = diag.with_help(ctx.clone());
                }
                diag
            }
        }
    }
}

/// Builder for creating cubeql errors with fluent API
pub struct ErrorBuilder {
    code: ErrorCode,
    message: String,
    expression: Option<String>,
    context: Option<String>,
}

impl ErrorBuilder {
    /// Create a new error builder
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            expression: None,
            context: None,
        }
    }

    /// Attach the rendered expression
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// Add context information
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Build a resolution error
    pub fn resolution(self) -> CubeError {
        CubeError::Resolution {
            code: self.code,
            message: self.message,
            expression: self.expression,
            context: self.context,
        }
    }

    /// Build an evaluation error
    pub fn evaluation(self) -> CubeError {
        CubeError::Evaluation {
            code: self.code,
            message: self.message,
            expression: self.expression,
            context: self.context,
        }
    }

    /// Build a model error
    pub fn model(self) -> CubeError {
        CubeError::Model {
            code: self.code,
            message: self.message,
            context: self.context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CQ0100, CQ0201, CQ0207};

    #[test]
    fn test_error_builder() {
        let err = ErrorBuilder::new(CQ0100, "No function matches 'Foo'")
            .expression("Foo([Time].[1997])")
            .context("Check the argument types")
            .resolution();

        assert!(matches!(err, CubeError::Resolution { .. }));
        assert_eq!(err.code(), CQ0100);
        assert_eq!(err.message(), "No function matches 'Foo'");
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::error(CQ0201, "dimensions do not match")
            .with_expression("Ancestor([Store].[USA], [Time].[Year])");

        let text = diag.to_string();
        assert!(text.contains("CQ0201"));
        assert!(text.contains("Ancestor("));
    }

    #[test]
    fn test_interruption() {
        assert!(CubeError::evaluation(CQ0207, "timed out").is_interruption());
        assert!(!CubeError::evaluation(CQ0201, "mismatch").is_interruption());
    }

    #[test]
    fn test_to_diagnostic_keeps_context() {
        let err = ErrorBuilder::new(CQ0201, "dimensions do not match")
            .context("Ancestor")
            .evaluation();
        let diag = err.to_diagnostic();
        assert_eq!(diag.code, CQ0201);
        assert_eq!(diag.help.as_deref(), Some("Ancestor"));
    }

    #[cfg(feature = "colored")]
    #[test]
    fn test_render_contains_code() {
        colored::control::set_override(false);
        let rendered = Diagnostic::error(CQ0100, "no match").render();
        assert!(rendered.starts_with("error[CQ0100]: no match"));
    }
}
