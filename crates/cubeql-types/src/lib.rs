//! cubeql type system
//!
//! This crate turns the resolved expression tree into a typed tree:
//! - [`OlapType`]: scalar, member, tuple, set and metadata types with
//!   hierarchy provenance
//! - [`TypeCoercer`]: the implicit conversions and their costs
//! - [`FunctionTable`]: every builtin overload, built once
//! - [`Resolver`]: unique lowest-cost overload selection
//! - [`Validator`]: produces [`TypedExpression`] and raises the static
//!   resolution errors

pub mod coercion;
pub mod error;
pub mod resolver;
pub mod scope;
pub mod signature;
pub mod table;
pub mod typed;
pub mod types;
pub mod validator;

pub use coercion::*;
pub use error::*;
pub use resolver::*;
pub use scope::*;
pub use signature::*;
pub use table::*;
pub use typed::*;
pub use types::*;
pub use validator::*;
