//! Data models for dbscope.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod result;
pub mod value;

// Re-export commonly used types
pub use connection::{ConnectionConfigError, ConnectionOptions, DatabaseType};
pub use result::{ExecuteResult, Row, row_into};
pub use value::{NamedArgs, SqlValue};
