//! PostgreSQL adapter.

use super::{Dialect, connection_suggestion, sqlx_pool_options};
use crate::config::PoolOptions;
use crate::db::params::bind_postgres_param;
use crate::db::provider::DatabaseProvider;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionOptions, DatabaseType, ExecuteResult, SqlValue};
use futures_util::TryStreamExt;
use futures_util::future::BoxFuture;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Either, Executor, Postgres};
use std::str::FromStr;
use tracing::info;

/// Numbered `$1, $2, ...` placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Open a pool from connection options.
    pub async fn connect(options: &ConnectionOptions) -> DbResult<DatabaseProvider<Self>> {
        options.validate(DatabaseType::PostgreSQL)?;
        let connect = PgConnectOptions::new()
            .host(&options.address)
            .port(options.port_or_default(DatabaseType::PostgreSQL))
            .username(&options.user_name)
            .password(&options.password)
            .database(&options.database);
        info!(database = %options.masked(DatabaseType::PostgreSQL), "Connecting to database");
        Self::open(connect, &options.pool).await
    }

    /// Open a pool from a `postgres://` URL.
    pub async fn connect_url(url: &str, pool: &PoolOptions) -> DbResult<DatabaseProvider<Self>> {
        let connect = PgConnectOptions::from_str(url).map_err(|e| {
            DbError::configuration(format!("Invalid PostgreSQL connection string: {}", e))
        })?;
        Self::open(connect, pool).await
    }

    async fn open(
        connect: PgConnectOptions,
        options: &PoolOptions,
    ) -> DbResult<DatabaseProvider<Self>> {
        options.validate().map_err(DbError::configuration)?;
        let pool = sqlx_pool_options::<Postgres>(options, false)
            .connect_with(connect)
            .await
            .map_err(|e| {
                DbError::acquisition(
                    format!("Failed to connect: {}", e),
                    connection_suggestion(DatabaseType::PostgreSQL, &e),
                )
            })?;
        Ok(DatabaseProvider::new(Self, pool, options.acquire_timeout()))
    }
}

impl Dialect for PostgresDialect {
    type Database = Postgres;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    fn placeholder(&self, _name: &str, index: usize) -> String {
        format!("${}", index + 1)
    }

    fn raw_execute<'c>(
        &'c self,
        conn: &'c mut PgConnection,
        sql: &'c str,
        args: &'c [SqlValue],
    ) -> BoxFuture<'c, DbResult<ExecuteResult>> {
        Box::pin(async move {
            // Without arguments this is the simple query protocol
            let mut stream = if args.is_empty() {
                conn.fetch_many(sql)
            } else {
                let query = args.iter().fold(sqlx::query(sql), bind_postgres_param);
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
