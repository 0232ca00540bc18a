//! dbscope
//!
//! Named-parameter SQL over pooled connections for MySQL, PostgreSQL and SQLite.
//! Callers write `:name` placeholders, check out scoped clients from a bounded
//! provider, and get their connection back to the pool on every path.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, PoolOptions};
pub use db::{
    DatabaseClient, DatabaseProvider, Dialect, MySqlDialect, PostgresDialect, SqliteDialect,
};
pub use error::{DbError, DbResult};
pub use models::{ConnectionOptions, DatabaseType, ExecuteResult, NamedArgs, Row, SqlValue};
