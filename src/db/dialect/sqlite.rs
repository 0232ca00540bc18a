//! SQLite adapter.

use super::{Dialect, connection_suggestion, sqlx_pool_options};
use crate::config::PoolOptions;
use crate::db::params::bind_sqlite_param;
use crate::db::provider::DatabaseProvider;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionOptions, DatabaseType, ExecuteResult, SqlValue};
use futures_util::TryStreamExt;
use futures_util::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Either, Executor, Sqlite};
use std::str::FromStr;
use tracing::info;

/// `?` placeholders over a database file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Open a pool over the file named by `options.database`, creating it if missing.
    pub async fn connect(options: &ConnectionOptions) -> DbResult<DatabaseProvider<Self>> {
        options.validate(DatabaseType::SQLite)?;
        let connect = SqliteConnectOptions::new()
            .filename(&options.database)
            .create_if_missing(true);
        info!(database = %options.masked(DatabaseType::SQLite), "Connecting to database");
        Self::open(connect, &options.pool).await
    }

    /// Open a pool from a `sqlite:` URL.
    pub async fn connect_url(url: &str, pool: &PoolOptions) -> DbResult<DatabaseProvider<Self>> {
        let connect = SqliteConnectOptions::from_str(url)
            .map_err(|e| {
                DbError::configuration(format!("Invalid SQLite connection string: {}", e))
            })?
            .create_if_missing(true);
        Self::open(connect, pool).await
    }

    async fn open(
        connect: SqliteConnectOptions,
        options: &PoolOptions,
    ) -> DbResult<DatabaseProvider<Self>> {
        options.validate().map_err(DbError::configuration)?;
        let pool = sqlx_pool_options::<Sqlite>(options, true)
            .connect_with(connect)
            .await
            .map_err(|e| {
                DbError::acquisition(
                    format!("Failed to connect: {}", e),
                    connection_suggestion(DatabaseType::SQLite, &e),
                )
            })?;
        Ok(DatabaseProvider::new(Self, pool, options.acquire_timeout()))
    }
}

impl Dialect for SqliteDialect {
    type Database = Sqlite;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn placeholder(&self, _name: &str, _index: usize) -> String {
        "?".to_string()
    }

    fn raw_execute<'c>(
        &'c self,
        conn: &'c mut SqliteConnection,
        sql: &'c str,
        args: &'c [SqlValue],
    ) -> BoxFuture<'c, DbResult<ExecuteResult>> {
        Box::pin(async move {
            let mut stream = if args.is_empty() {
                conn.fetch_many(sql)
            } else {
                let query = args.iter().fold(sqlx::query(sql), bind_sqlite_param);
                conn.fetch_many(query)
            };

            let mut rows = Vec::new();
            let mut rows_affected = 0;
            while let Some(step) = stream.try_next().await? {
                match step {
                    Either::Left(done) => rows_affected += done.rows_affected(),
                    Either::Right(row) => rows.push(row.to_json_map()),
                }
            }
            Ok(ExecuteResult::new(rows, rows_affected))
        })
    }
}
