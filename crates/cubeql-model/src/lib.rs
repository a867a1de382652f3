//! Cube metadata model for cubeql
//!
//! This crate provides:
//! - Copyable identifiers for dimensions, hierarchies, levels and members
//! - The [`Member`] handle (stored, calculated or the null sentinel)
//! - An in-memory [`Cube`] built from a [`CubeDefinition`] (JSON or builder)
//! - The [`SchemaReader`] navigation interface the evaluator reads through
//! - The [`CellReader`] interface and an in-memory [`FactTable`]

pub mod cell;
pub mod cube;
pub mod definition;
pub mod error;
pub mod ids;
pub mod member;
pub mod reader;
pub mod sample;

pub use cell::*;
pub use cube::*;
pub use definition::*;
pub use error::*;
pub use ids::*;
pub use member::*;
pub use reader::*;
