//! MySQL / MariaDB adapter.

use super::{Dialect, connection_suggestion, sqlx_pool_options};
use crate::config::PoolOptions;
use crate::db::params::bind_mysql_param;
use crate::db::provider::DatabaseProvider;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionOptions, DatabaseType, ExecuteResult, SqlValue};
use futures_util::TryStreamExt;
use futures_util::future::BoxFuture;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Either, Executor, MySql};
use std::str::FromStr;
use tracing::info;

/// `?` placeholders, utf8mb4 connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Open a pool from connection options.
    pub async fn connect(options: &ConnectionOptions) -> DbResult<DatabaseProvider<Self>> {
        options.validate(DatabaseType::MySQL)?;
        let connect = MySqlConnectOptions::new()
            .host(&options.address)
            .port(options.port_or_default(DatabaseType::MySQL))
            .username(&options.user_name)
            .password(&options.password)
            .database(&options.database)
            .charset("utf8mb4");
        info!(database = %options.masked(DatabaseType::MySQL), "Connecting to database");
        Self::open(connect, &options.pool).await
    }

    /// Open a pool from a `mysql://` URL.
    pub async fn connect_url(url: &str, pool: &PoolOptions) -> DbResult<DatabaseProvider<Self>> {
        let connect = MySqlConnectOptions::from_str(url)
            .map_err(|e| {
                DbError::configuration(format!("Invalid MySQL connection string: {}", e))
            })?
            .charset("utf8mb4");
        Self::open(connect, pool).await
    }

    async fn open(
        connect: MySqlConnectOptions,
        options: &PoolOptions,
    ) -> DbResult<DatabaseProvider<Self>> {
        options.validate().map_err(DbError::configuration)?;
        let pool = sqlx_pool_options::<MySql>(options, false)
            .connect_with(connect)
            .await
            .map_err(|e| {
                DbError::acquisition(
                    format!("Failed to connect: {}", e),
                    connection_suggestion(DatabaseType::MySQL, &e),
                )
            })?;
        Ok(DatabaseProvider::new(Self, pool, options.acquire_timeout()))
    }
}

impl Dialect for MySqlDialect {
    type Database = MySql;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn placeholder(&self, _name: &str, _index: usize) -> String {
        "?".to_string()
    }

    fn raw_execute<'c>(
        &'c self,
        conn: &'c mut MySqlConnection,
        sql: &'c str,
        args: &'c [SqlValue],
    ) -> BoxFuture<'c, DbResult<ExecuteResult>> {
        Box::pin(async move {
            let mut stream = if args.is_empty() {
                conn.fetch_many(sql)
            } else {
                let query = args.iter().fold(sqlx::query(sql), bind_mysql_param);
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
