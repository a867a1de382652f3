//! Evaluation options
//!
//! Options are plain serde data so they can be loaded from JSON next to a
//! cube definition, or assembled in code with [`EvaluationOptionsBuilder`].

use cubeql_diagnostics::{CQ0401, CubeError};
use serde::{Deserialize, Serialize};

/// What `x / NULL` and `x / 0` evaluate to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NullDivision {
    /// Infinity with the sign of the dividend (NaN for `0 / 0`)
    #[default]
    Infinity,
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvaluationOptions {
    pub null_division: NullDivision,
    /// Evaluate context-independent arguments of iterating functions once
    pub hoist_constants: bool,
    /// Wall-clock budget for one evaluation or query
    pub timeout_ms: Option<u64>,
    /// Set elements processed between clock reads
    pub check_interval: u32,
    /// Nesting limit for calculated member formulas
    pub max_recursion_depth: usize,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            null_division: NullDivision::Infinity,
            hoist_constants: true,
            timeout_ms: None,
            check_interval: 64,
            max_recursion_depth: 64,
        }
    }
}

impl EvaluationOptions {
    pub fn builder() -> EvaluationOptionsBuilder {
        EvaluationOptionsBuilder::default()
    }

    /// Load options from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, CubeError> {
        serde_json::from_str(json).map_err(|e| {
            CubeError::system(CQ0401, format!("Invalid evaluation options: {}", e))
        })
    }
}

/// Builder for [`EvaluationOptions`]
#[derive(Debug, Clone, Default)]
pub struct EvaluationOptionsBuilder {
    options: EvaluationOptions,
}

impl EvaluationOptionsBuilder {
    pub fn null_division(mut self, mode: NullDivision) -> Self {
        self.options.null_division = mode;
        self
    }

    pub fn hoist_constants(mut self, enabled: bool) -> Self {
        self.options.hoist_constants = enabled;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.options.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn check_interval(mut self, interval: u32) -> Self {
        self.options.check_interval = interval.max(1);
        self
    }

    pub fn max_recursion_depth(mut self, depth: usize) -> Self {
        self.options.max_recursion_depth = depth;
        self
    }

    pub fn build(self) -> EvaluationOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_json_fills_defaults() {
        let options =
            EvaluationOptions::from_json_str(r#"{"nullDivision": "null", "timeoutMs": 250}"#)
                .unwrap();
        assert_eq!(options.null_division, NullDivision::Null);
        assert_eq!(options.timeout_ms, Some(250));
        assert!(options.hoist_constants);
        assert_eq!(options.check_interval, 64);
    }

    #[test]
    fn test_invalid_json_is_a_system_error() {
        let err = EvaluationOptions::from_json_str(r#"{"nullDivision": "zero"}"#).unwrap_err();
        assert_eq!(err.code(), CQ0401);
    }

    #[test]
    fn test_builder() {
        let options = EvaluationOptions::builder()
            .hoist_constants(false)
            .check_interval(0)
            .max_recursion_depth(8)
            .build();
        assert!(!options.hoist_constants);
        assert_eq!(options.check_interval, 1);
        assert_eq!(options.max_recursion_depth, 8);
        assert_eq!(options.null_division, NullDivision::Infinity);
    }

    #[test]
    fn test_serialized_options_are_the_documented_ones() {
        let json = serde_json::to_value(EvaluationOptions::default()).unwrap();
        let mut fields: Vec<&String> = json.as_object().unwrap().keys().collect();
        fields.sort();
        assert_eq!(
            fields,
            vec![
                "checkInterval",
                "hoistConstants",
                "maxRecursionDepth",
                "nullDivision",
                "timeoutMs",
            ]
        );
    }
}
