//! cubeql evaluation engine
//!
//! This crate compiles typed expressions into evaluable units and runs them
//! against a cube:
//!
//! - **Values**: scalars with distinct `Null` and `Empty`, members, tuples
//!   and sets ([`Value`], [`TupleList`])
//! - **Context**: current member per hierarchy, named-set cursors and the
//!   existing (slicer) tuple, all overridden in scoped closures
//!   ([`EvaluationContext`])
//! - **Compiler**: one [`CompiledUnit`] per node with a result style
//!   (value, iterable, list, mutable list) and constant hoisting
//! - **Dependency analysis**: [`depends_on`]
//! - **Function library**: navigation, time series, set algebra, ordering,
//!   aggregation, scalar and string functions, plus user functions
//! - **Queries**: [`CubeEngine::execute_query`] runs formulas, slicer, axes
//!   and cells
//!
//! # Example
//!
//! ```ignore
//! use cubeql_eval::CubeEngine;
//!
//! let engine = CubeEngine::new(cube, cells);
//! let prepared = engine.prepare(&expression)?;
//! let mut ctx = engine.new_context();
//! let value = engine.evaluate(&prepared, &mut ctx)?;
//! ```
//!
//! # Null and Empty
//!
//! - `NULL + x = x`, `NULL * x = NULL`
//! - division by an absent value or zero follows
//!   [`EvaluationOptions::null_division`]
//! - comparisons with an absent operand are `NULL`; logic is three-valued

pub mod compiler;
pub mod context;
pub mod dependency;
pub mod engine;
pub mod error;
mod functions;
pub mod limits;
pub mod navigation;
pub mod options;
pub mod query;
pub mod set_ops;
pub mod user;
pub mod value;

pub use compiler::{CompiledUnit, Compiler, Evaluator, ResultStyle};
pub use context::{EvaluationContext, SetCursor};
pub use dependency::{depends_on, is_context_free};
pub use engine::{CubeEngine, PreparedExpression};
pub use error::{EvalError, EvalResult};
pub use limits::CancellationToken;
pub use options::{EvaluationOptions, EvaluationOptionsBuilder, NullDivision};
pub use query::{Cell, QueryResult};
pub use user::{FnUserFunction, UserFunction, UserFunctionError, UserFunctions};
pub use value::{Tuple, TupleList, Value, tuple_of};
