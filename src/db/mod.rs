//! Database access layer.
//!
//! This module provides:
//! - Named-parameter translation
//! - Dialect adapters for MySQL, PostgreSQL and SQLite
//! - Scoped clients with explicit transaction control
//! - Pooled providers with guaranteed client release
//! - Row decoding and parameter binding

pub mod client;
pub mod dialect;
#[macro_use]
pub mod macros;
pub(crate) mod params;
pub mod provider;
pub mod translator;
pub mod types;

pub use client::{DatabaseClient, TransactionOutcome, TransactionState, paged_sql, single_row_sql};
pub use dialect::{Dialect, MySqlDialect, PostgresDialect, SqliteDialect};
pub use provider::{DatabaseProvider, ProviderStatus};
pub use translator::{Quoting, TranslatedSql, translate, translate_with};
