//! cubeql error codes following a structured numbering system
//!
//! Error code ranges:
//! - CQ0100-CQ0199: Resolution errors (overloads, typing, static set checks)
//! - CQ0200-CQ0299: Evaluation errors (runtime, including interruption)
//! - CQ0300-CQ0399: Model errors (cube metadata, cell readers)
//! - CQ0400-CQ0499: System errors (configuration, internal)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Error code identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(u16);

impl ErrorCode {
    /// Create a new error code
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Get the numeric code
    pub const fn code(&self) -> u16 {
        self.0
    }

    /// Get error information for this code
    pub fn info(&self) -> &'static ErrorInfo {
        ERROR_INFO.get(&self.0).unwrap_or(&UNKNOWN_ERROR)
    }

    /// Check if this is a resolution error (0100-0199)
    pub const fn is_resolution_error(&self) -> bool {
        self.0 >= 100 && self.0 < 200
    }

    /// Check if this is an evaluation error (0200-0299)
    pub const fn is_evaluation_error(&self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Check if this is a model error (0300-0399)
    pub const fn is_model_error(&self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    /// Check if this is a system error (0400-0499)
    pub const fn is_system_error(&self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Check if this code marks a cancelled or timed out evaluation
    pub const fn is_interruption(&self) -> bool {
        self.0 == CQ0206.0 || self.0 == CQ0207.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CQ{:04}", self.0)
    }
}

/// Information about an error code
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Short description of the error
    pub description: &'static str,
    /// Detailed help text
    pub help: Option<&'static str>,
}

impl ErrorInfo {
    const fn new(description: &'static str) -> Self {
        Self {
            description,
            help: None,
        }
    }

    const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

static UNKNOWN_ERROR: ErrorInfo = ErrorInfo::new("Unknown error");

static ERROR_INFO: LazyLock<HashMap<u16, ErrorInfo>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    // Resolution errors (0100-0199)
    map.insert(
        100,
        ErrorInfo::new("No matching function")
            .with_help("Check the function name and the types of its arguments"),
    );
    map.insert(101, ErrorInfo::new("Ambiguous function call"));
    map.insert(
        102,
        ErrorInfo::new("Dimension has multiple hierarchies")
            .with_help("Qualify the reference with a hierarchy name"),
    );
    map.insert(103, ErrorInfo::new("Duplicate hierarchy in tuple"));
    map.insert(104, ErrorInfo::new("Mismatched hierarchies in set"));
    map.insert(105, ErrorInfo::new("Invalid flag"));
    map.insert(106, ErrorInfo::new("Unknown named set"));
    map.insert(107, ErrorInfo::new("Duplicate definition"));
    map.insert(108, ErrorInfo::new("Type mismatch"));
    map.insert(109, ErrorInfo::new("Invalid argument"));

    // Evaluation errors (0200-0299)
    map.insert(200, ErrorInfo::new("Evaluation failed"));
    map.insert(201, ErrorInfo::new("Hierarchies do not match"));
    map.insert(
        202,
        ErrorInfo::new("Duplicate hierarchy in crossjoin")
            .with_help("Each hierarchy may appear at most once in a tuple"),
    );
    map.insert(203, ErrorInfo::new("Type mismatch"));
    map.insert(204, ErrorInfo::new("User function failed"));
    map.insert(205, ErrorInfo::new("Recursion limit exceeded"));
    map.insert(206, ErrorInfo::new("Evaluation cancelled"));
    map.insert(207, ErrorInfo::new("Timeout"));
    map.insert(208, ErrorInfo::new("Invalid argument"));
    map.insert(209, ErrorInfo::new("Aggregation not supported"));
    map.insert(210, ErrorInfo::new("Cell read failed"));
    map.insert(
        211,
        ErrorInfo::new("Slicer set is empty").with_help("Every cell of the query is empty"),
    );

    // Model errors (0300-0399)
    map.insert(300, ErrorInfo::new("Invalid cube definition"));
    map.insert(301, ErrorInfo::new("Unknown dimension"));
    map.insert(302, ErrorInfo::new("Unknown hierarchy"));
    map.insert(303, ErrorInfo::new("Unknown level"));
    map.insert(304, ErrorInfo::new("Unknown member"));
    map.insert(305, ErrorInfo::new("Unknown measure"));
    map.insert(306, ErrorInfo::new("Invalid parent reference"));
    map.insert(307, ErrorInfo::new("Cycle in parent-child hierarchy"));
    map.insert(308, ErrorInfo::new("Cell read failed"));
    map.insert(309, ErrorInfo::new("Cube definition could not be loaded"));

    // System errors (0400-0499)
    map.insert(400, ErrorInfo::new("Internal error"));
    map.insert(401, ErrorInfo::new("Configuration error"));
    map.insert(402, ErrorInfo::new("Invalid format"));

    map
});

// Convenient error code constants

// Resolution errors
pub const CQ0100: ErrorCode = ErrorCode::new(100);
pub const CQ0101: ErrorCode = ErrorCode::new(101);
pub const CQ0102: ErrorCode = ErrorCode::new(102);
pub const CQ0103: ErrorCode = ErrorCode::new(103);
pub const CQ0104: ErrorCode = ErrorCode::new(104);
pub const CQ0105: ErrorCode = ErrorCode::new(105);
pub const CQ0106: ErrorCode = ErrorCode::new(106);
pub const CQ0107: ErrorCode = ErrorCode::new(107);
pub const CQ0108: ErrorCode = ErrorCode::new(108);
pub const CQ0109: ErrorCode = ErrorCode::new(109);

// Evaluation errors
pub const CQ0200: ErrorCode = ErrorCode::new(200);
pub const CQ0201: ErrorCode = ErrorCode::new(201);
pub const CQ0202: ErrorCode = ErrorCode::new(202);
pub const CQ0203: ErrorCode = ErrorCode::new(203);
pub const CQ0204: ErrorCode = ErrorCode::new(204);
pub const CQ0205: ErrorCode = ErrorCode::new(205);
pub const CQ0206: ErrorCode = ErrorCode::new(206);
pub const CQ0207: ErrorCode = ErrorCode::new(207);
pub const CQ0208: ErrorCode = ErrorCode::new(208);
pub const CQ0209: ErrorCode = ErrorCode::new(209);
pub const CQ0210: ErrorCode = ErrorCode::new(210);
pub const CQ0211: ErrorCode = ErrorCode::new(211);

// Model errors
pub const CQ0300: ErrorCode = ErrorCode::new(300);
pub const CQ0301: ErrorCode = ErrorCode::new(301);
pub const CQ0302: ErrorCode = ErrorCode::new(302);
pub const CQ0303: ErrorCode = ErrorCode::new(303);
pub const CQ0304: ErrorCode = ErrorCode::new(304);
pub const CQ0305: ErrorCode = ErrorCode::new(305);
pub const CQ0306: ErrorCode = ErrorCode::new(306);
pub const CQ0307: ErrorCode = ErrorCode::new(307);
pub const CQ0308: ErrorCode = ErrorCode::new(308);
pub const CQ0309: ErrorCode = ErrorCode::new(309);

// System errors
pub const CQ0400: ErrorCode = ErrorCode::new(400);
pub const CQ0401: ErrorCode = ErrorCode::new(401);
pub const CQ0402: ErrorCode = ErrorCode::new(402);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(CQ0100.to_string(), "CQ0100");
        assert_eq!(CQ0207.to_string(), "CQ0207");
    }

    #[test]
    fn test_error_categories() {
        assert!(CQ0100.is_resolution_error());
        assert!(!CQ0100.is_evaluation_error());

        assert!(CQ0200.is_evaluation_error());
        assert!(CQ0300.is_model_error());
        assert!(CQ0400.is_system_error());
    }

    #[test]
    fn test_interruption_codes() {
        assert!(CQ0206.is_interruption());
        assert!(CQ0207.is_interruption());
        assert!(!CQ0201.is_interruption());
    }

    #[test]
    fn test_error_info() {
        assert_eq!(CQ0101.info().description, "Ambiguous function call");
        assert!(CQ0102.info().help.is_some());
        assert_eq!(ErrorCode::new(999).info().description, "Unknown error");
    }
}
