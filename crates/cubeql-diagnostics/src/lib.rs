//! cubeql diagnostics and error handling
//!
//! This crate provides the error handling infrastructure shared by every
//! cubeql crate: stable error codes, the umbrella [`CubeError`] and the
//! [`Diagnostic`] form used when reporting errors to a user.

mod error;
mod error_code;

pub use error::*;
pub use error_code::*;

/// Result type for cubeql operations
pub type Result<T> = std::result::Result<T, CubeError>;
