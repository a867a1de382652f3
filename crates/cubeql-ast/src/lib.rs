//! Resolved expression tree for cubeql
//!
//! The nodes here are what a front end hands to the engine after name
//! resolution: metadata references are already bound to cube objects, but
//! function calls are still untyped and unresolved. The tree mirrors MDX
//! closely; `Display` renders MDX-like text for error messages.

mod expression;
mod literal;
mod query;
mod syntax;

pub use expression::*;
pub use literal::*;
pub use query::*;
pub use syntax::*;
