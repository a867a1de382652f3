//! Multidimensional expression compiler and evaluator for Rust
//!
//! This crate bundles the cubeql workspace:
//! - Cube metadata, member handles and a fact-table cell reader
//! - Resolved expression trees and query definitions
//! - Type inference, overload resolution and dependency analysis
//! - Compilation to evaluable units and query execution
//!
//! # Example
//!
//! ```ignore
//! use cubeql::{Expression, sample_engine};
//!
//! let engine = sample_engine()?;
//! let usa = Expression::member(engine.schema().as_ref(), "[Store].[USA]")?;
//! let prepared = engine.prepare(&Expression::property("Children", usa))?;
//! let mut ctx = engine.new_context();
//! let states = engine.evaluate(&prepared, &mut ctx)?;
//! ```

use std::sync::Arc;

// Re-export all public APIs from internal crates
pub use cubeql_ast as ast;
pub use cubeql_diagnostics as diagnostics;
pub use cubeql_eval as eval;
pub use cubeql_model as model;
pub use cubeql_types as types;

// Convenience re-exports
pub use cubeql_ast::{Expression, QueryDefinition};
pub use cubeql_diagnostics::{CubeError, Result};
pub use cubeql_eval::{
    CancellationToken, CubeEngine, EvaluationContext, EvaluationOptions, PreparedExpression,
    QueryResult, Value,
};
pub use cubeql_model::{Cube, CubeDefinition, FactTable, Member, SchemaReader};
pub use cubeql_types::{Category, OlapType};

/// Build a cube from its JSON definition
pub fn cube_from_json(json: &str) -> Result<Arc<Cube>> {
    let cube = CubeDefinition::from_json_str(json)?.build()?;
    log::debug!("loaded cube {}", cube.name());
    Ok(Arc::new(cube))
}

/// An engine over the bundled sample sales cube and its facts
pub fn sample_engine() -> Result<CubeEngine> {
    let cube = model::sample::sales_cube()?;
    let facts = model::sample::sales_facts(&cube)?;
    log::debug!("sample cube loaded with {} fact rows", facts.len());
    Ok(CubeEngine::new(cube, Arc::new(facts)))
}
