//! Pooled provider.
//!
//! A [`DatabaseProvider`] owns a backend pool and hands out scoped clients. At
//! most `max_connections` clients exist at once; further callers wait in FIFO
//! order until a client is released, or until the acquisition timeout expires
//! when one is configured.
//!
//! The one-shot operations (`execute`, `query_page`, ...) acquire a client, run
//! one statement and release it on every path. If both the operation and the
//! release fail, the operation's error is returned and the release failure is
//! logged.

use crate::db::client::DatabaseClient;
use crate::db::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, ExecuteResult, NamedArgs, Row, SqlValue};
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use sqlx::Pool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Point-in-time view of a provider's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ProviderStatus {
    pub max_connections: u32,
    /// Clients currently checked out
    pub in_use: u32,
    /// Clients that can be handed out without waiting
    pub available: u32,
    /// Open connections, idle or not
    pub pool_size: u32,
    pub idle: u32,
}

/// Hands out [`DatabaseClient`]s over a bounded pool.
pub struct DatabaseProvider<D: Dialect> {
    dialect: Arc<D>,
    pool: Pool<D::Database>,
    slots: Arc<Semaphore>,
    max_connections: u32,
    acquire_timeout: Option<Duration>,
}

impl<D: Dialect> Clone for DatabaseProvider<D> {
    fn clone(&self) -> Self {
        Self {
            dialect: Arc::clone(&self.dialect),
            pool: self.pool.clone(),
            slots: Arc::clone(&self.slots),
            max_connections: self.max_connections,
            acquire_timeout: self.acquire_timeout,
        }
    }
}

impl<D: Dialect> std::fmt::Debug for DatabaseProvider<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseProvider")
            .field("database_type", &self.dialect.database_type())
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}

impl<D: Dialect> DatabaseProvider<D> {
    /// Wrap an open sqlx pool. The client bound follows the pool's `max_connections`.
    pub fn new(dialect: D, pool: Pool<D::Database>, acquire_timeout: Option<Duration>) -> Self {
        let max_connections = pool.options().get_max_connections();
        info!(
            database_type = %dialect.database_type(),
            max_connections,
            acquire_timeout_secs = ?acquire_timeout.map(|t| t.as_secs()),
            "Provider ready"
        );
        Self {
            dialect: Arc::new(dialect),
            pool,
            slots: Arc::new(Semaphore::new(max_connections as usize)),
            max_connections,
            acquire_timeout,
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        self.dialect.database_type()
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Check out a client, waiting for a free slot if all are in use.
    pub async fn get_client(&self) -> DbResult<DatabaseClient<D>> {
        let slot = Arc::clone(&self.slots).acquire_owned();
        let permit = match self.acquire_timeout {
            Some(limit) => tokio::time::timeout(limit, slot).await.map_err(|_| {
                DbError::acquisition(
                    format!(
                        "No connection became available within {}s",
                        limit.as_secs_f64()
                    ),
                    "Increase max_connections or acquire_timeout, or release clients sooner",
                )
            })?,
            None => slot.await,
        }
        .map_err(|_| DbError::acquisition("Provider has been closed", "Create a new provider"))?;

        let conn = self.pool.acquire().await.map_err(|e| match DbError::from(e) {
            err @ DbError::ConnectionAcquisitionFailed { .. } => err,
            other => DbError::acquisition(
                other.to_string(),
                "Check that the database is reachable and accepting connections",
            ),
        })?;

        Ok(DatabaseClient::new(conn, Arc::clone(&self.dialect), Some(permit)))
    }

    /// Execute a statement with named parameters on a fresh client.
    pub async fn execute(&self, sql: &str, args: &NamedArgs) -> DbResult<ExecuteResult> {
        let mut client = self.get_client().await?;
        let result = client.execute(sql, args).await;
        finish(client, result).await
    }

    /// Execute a statement with positional arguments on a fresh client.
    pub async fn execute_positional(
        &self,
        sql: &str,
        args: &[SqlValue],
    ) -> DbResult<ExecuteResult> {
        let mut client = self.get_client().await?;
        let result = client.execute_positional(sql, args).await;
        finish(client, result).await
    }

    /// See [`DatabaseClient::query_page`].
    pub async fn query_page(&self, sql: &str, args: &NamedArgs) -> DbResult<ExecuteResult> {
        let mut client = self.get_client().await?;
        let result = client.query_page(sql, args).await;
        finish(client, result).await
    }

    /// See [`DatabaseClient::query_one`].
    pub async fn query_one(&self, sql: &str, args: &NamedArgs) -> DbResult<Option<Row>> {
        let mut client = self.get_client().await?;
        let result = client.query_one(sql, args).await;
        finish(client, result).await
    }

    /// See [`DatabaseClient::query_one_positional`].
    pub async fn query_one_positional(
        &self,
        sql: &str,
        args: &[SqlValue],
    ) -> DbResult<Option<Row>> {
        let mut client = self.get_client().await?;
        let result = client.query_one_positional(sql, args).await;
        finish(client, result).await
    }

    /// See [`DatabaseClient::query_one_as`].
    pub async fn query_one_as<T: DeserializeOwned>(
        &self,
        sql: &str,
        args: &NamedArgs,
    ) -> DbResult<Option<T>> {
        let mut client = self.get_client().await?;
        let result = client.query_one_as(sql, args).await;
        finish(client, result).await
    }

    /// Run `callback` inside a transaction.
    ///
    /// Commits when the callback succeeds. When the callback or the commit fails,
    /// the transaction is rolled back and the original error is returned; a
    /// rollback failure is attached to it rather than replacing it. The client
    /// is released exactly once either way.
    ///
    /// ```ignore
    /// let id = provider
    ///     .use_transaction(|client| {
    ///         Box::pin(async move {
    ///             client.execute("INSERT INTO t (v) VALUES (:v)", &args).await?;
    ///             let row = client.query_one("SELECT last_insert_rowid() AS id", &NamedArgs::new()).await?;
    ///             Ok(row)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn use_transaction<F, T>(&self, callback: F) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c mut DatabaseClient<D>) -> BoxFuture<'c, DbResult<T>>,
    {
        let mut client = self.get_client().await?;
        if let Err(e) = client.begin_transaction().await {
            return finish(client, Err(e)).await;
        }

        let outcome = match callback(&mut client).await {
            Ok(value) => match client.commit().await {
                Ok(()) => Ok(value),
                Err(commit_error) => Err(roll_back_after(&mut client, commit_error).await),
            },
            Err(e) => Err(roll_back_after(&mut client, e).await),
        };

        finish(client, outcome).await
    }

    /// Current pool occupancy.
    pub fn status(&self) -> ProviderStatus {
        let available = self.slots.available_permits() as u32;
        ProviderStatus {
            max_connections: self.max_connections,
            in_use: self.max_connections.saturating_sub(available),
            available,
            pool_size: self.pool.size(),
            idle: self.pool.num_idle() as u32,
        }
    }

    /// Stop handing out clients and close the pool.
    ///
    /// Waiting callers fail with an acquisition error; outstanding clients can
    /// still be released.
    pub async fn close(&self) {
        self.slots.close();
        self.pool.close().await;
        info!(database_type = %self.dialect.database_type(), "Provider closed");
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }
}

async fn roll_back_after<D: Dialect>(client: &mut DatabaseClient<D>, cause: DbError) -> DbError {
    match client.rollback().await {
        Ok(()) => cause,
        Err(rollback_error) => {
            error!(
                client_id = %client.id(),
                error = %cause,
                rollback_error = %rollback_error,
                "Rollback failed after transaction error"
            );
            cause.with_rollback_failure(rollback_error)
        }
    }
}

/// Release `client` and combine the outcome with the operation's result.
async fn finish<D: Dialect, T>(client: DatabaseClient<D>, result: DbResult<T>) -> DbResult<T> {
    let client_id = client.id();
    match (result, client.release().await) {
        (result, Ok(())) => result,
        (Ok(value), Err(release_error)) => {
            warn!(
                client_id = %client_id,
                error = %release_error,
                "Failed to release client after a successful operation"
            );
            Ok(value)
        }
        (Err(e), Err(release_error)) => {
            error!(
                client_id = %client_id,
                error = %e,
                release_error = %release_error,
                "Failed to release client after a failed operation"
            );
            Err(e)
        }
    }
}
