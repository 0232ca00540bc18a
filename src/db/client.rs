//! Scoped database client.
//!
//! A [`DatabaseClient`] owns one pooled connection from checkout to release and
//! tracks whether an explicit transaction is open on it.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --begin--> InTransaction --commit---> Idle (last outcome: Committed)
//!                               --rollback-> Idle (last outcome: RolledBack)
//! ```
//!
//! `release()` returns the connection, rolling back first if a transaction is
//! still open. A client dropped without `release()` does the same from a
//! spawned task.

use crate::db::dialect::Dialect;
use crate::db::translator;
use crate::error::{DbError, DbResult};
use crate::models::{ExecuteResult, NamedArgs, Row, SqlValue, row_into};
use serde::de::DeserializeOwned;
use sqlx::Connection as _;
use sqlx::pool::PoolConnection;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Whether an explicit transaction is open on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    InTransaction,
}

impl TransactionState {
    fn describe(self) -> &'static str {
        match self {
            Self::Idle => "no transaction is active",
            Self::InTransaction => "a transaction is active",
        }
    }
}

/// How the most recent transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Committed,
    RolledBack,
}

/// Append the paging clauses for the `limit` and `offset` arguments that are set.
///
/// Trailing whitespace and one trailing `;` are stripped first.
pub fn paged_sql(sql: &str, args: &NamedArgs) -> String {
    let mut paged = strip_terminator(sql).to_string();
    if args.is_set("limit") {
        paged.push_str(" LIMIT :limit");
    }
    if args.is_set("offset") {
        paged.push_str(" OFFSET :offset");
    }
    paged
}

/// Restrict a query to its first row.
pub fn single_row_sql(sql: &str) -> String {
    format!("{} LIMIT 1", strip_terminator(sql))
}

fn strip_terminator(sql: &str) -> &str {
    let trimmed = sql.trim_end();
    trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end()
}

/// A pooled connection checked out for one caller.
pub struct DatabaseClient<D: Dialect> {
    id: Uuid,
    conn: Option<PoolConnection<D::Database>>,
    dialect: Arc<D>,
    state: TransactionState,
    last_outcome: Option<TransactionOutcome>,
    /// Set when a rollback failed; the connection must not go back to the pool.
    broken: bool,
    /// Slot in the provider's bound, freed after the connection is returned.
    permit: Option<OwnedSemaphorePermit>,
}

impl<D: Dialect> std::fmt::Debug for DatabaseClient<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseClient")
            .field("id", &self.id)
            .field("database_type", &self.dialect.database_type())
            .field("state", &self.state)
            .field("last_outcome", &self.last_outcome)
            .field("broken", &self.broken)
            .field("released", &self.conn.is_none())
            .finish_non_exhaustive()
    }
}

impl<D: Dialect> DatabaseClient<D> {
    pub(crate) fn new(
        conn: PoolConnection<D::Database>,
        dialect: Arc<D>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!(client_id = %id, database_type = %dialect.database_type(), "Client acquired");
        Self {
            id,
            conn: Some(conn),
            dialect,
            state: TransactionState::Idle,
            last_outcome: None,
            broken: false,
            permit,
        }
    }

    /// Identifier used in log records for this client.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.state
    }

    pub fn last_outcome(&self) -> Option<TransactionOutcome> {
        self.last_outcome
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Execute a statement with named parameters.
    pub async fn execute(&mut self, sql: &str, args: &NamedArgs) -> DbResult<ExecuteResult> {
        let dialect = Arc::clone(&self.dialect);
        let translated = translator::translate_with(sql, args, dialect.quoting(), |name, index| {
            dialect.placeholder(name, index)
        })?;
        self.run(&translated.sql, &translated.args).await
    }

    /// Execute a statement whose placeholders are already in the dialect's syntax.
    pub async fn execute_positional(
        &mut self,
        sql: &str,
        args: &[SqlValue],
    ) -> DbResult<ExecuteResult> {
        self.run(sql, args).await
    }

    /// Execute a query with `LIMIT :limit` / `OFFSET :offset` appended for the
    /// arguments that are present and not null.
    pub async fn query_page(&mut self, sql: &str, args: &NamedArgs) -> DbResult<ExecuteResult> {
        let paged = paged_sql(sql, args);
        self.execute(&paged, args).await
    }

    /// Execute a query restricted to one row.
    pub async fn query_one(&mut self, sql: &str, args: &NamedArgs) -> DbResult<Option<Row>> {
        let single = single_row_sql(sql);
        Ok(self.execute(&single, args).await?.into_first())
    }

    /// Positional form of [`query_one`](Self::query_one).
    pub async fn query_one_positional(
        &mut self,
        sql: &str,
        args: &[SqlValue],
    ) -> DbResult<Option<Row>> {
        let single = single_row_sql(sql);
        Ok(self.run(&single, args).await?.into_first())
    }

    /// [`query_one`](Self::query_one), deserialized into `T`.
    pub async fn query_one_as<T: DeserializeOwned>(
        &mut self,
        sql: &str,
        args: &NamedArgs,
    ) -> DbResult<Option<T>> {
        self.query_one(sql, args).await?.map(row_into).transpose()
    }

    /// Start an explicit transaction.
    pub async fn begin_transaction(&mut self) -> DbResult<()> {
        if self.state != TransactionState::Idle {
            return Err(DbError::invalid_transaction_state(
                "begin a transaction",
                self.state.describe(),
            ));
        }
        self.run("BEGIN", &[]).await?;
        self.state = TransactionState::InTransaction;
        debug!(client_id = %self.id, "Transaction started");
        Ok(())
    }

    /// Commit the open transaction.
    ///
    /// On failure the transaction stays open so the caller can roll it back.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.require_transaction("commit")?;
        self.run("COMMIT", &[]).await?;
        self.finish_transaction(TransactionOutcome::Committed);
        Ok(())
    }

    /// Roll back the open transaction.
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.require_transaction("roll back")?;
        if let Err(e) = self.run("ROLLBACK", &[]).await {
            self.broken = true;
            return Err(e);
        }
        self.finish_transaction(TransactionOutcome::RolledBack);
        Ok(())
    }

    /// Return the connection to its pool.
    ///
    /// An open transaction is rolled back first. A connection whose rollback
    /// failed is closed instead of being returned.
    pub async fn release(mut self) -> DbResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        let permit = self.permit.take();
        let result = return_connection(
            conn,
            self.dialect.as_ref(),
            self.state == TransactionState::InTransaction,
            self.broken,
            self.id,
        )
        .await;
        drop(permit);
        debug!(client_id = %self.id, ok = result.is_ok(), "Client released");
        result
    }

    fn require_transaction(&self, operation: &'static str) -> DbResult<()> {
        if self.state != TransactionState::InTransaction {
            return Err(DbError::invalid_transaction_state(
                operation,
                self.state.describe(),
            ));
        }
        Ok(())
    }

    fn finish_transaction(&mut self, outcome: TransactionOutcome) {
        self.state = TransactionState::Idle;
        self.last_outcome = Some(outcome);
        debug!(client_id = %self.id, outcome = ?outcome, "Transaction finished");
    }

    async fn run(&mut self, sql: &str, args: &[SqlValue]) -> DbResult<ExecuteResult> {
        let conn = self.conn.as_mut().ok_or_else(|| {
            DbError::acquisition(
                "Client no longer holds a connection",
                "Acquire a new client from the provider",
            )
        })?;

        debug!(client_id = %self.id, sql = %sql, params = args.len(), "Executing statement");
        let start = Instant::now();
        let result = self.dialect.raw_execute(&mut **conn, sql, args).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(r) => debug!(
                client_id = %self.id,
                row_count = r.row_count,
                elapsed_ms,
                "Statement completed"
            ),
            Err(e) => debug!(client_id = %self.id, error = %e, elapsed_ms, "Statement failed"),
        }
        result
    }
}

/// Roll back if needed, then return or discard the connection.
async fn return_connection<D: Dialect>(
    mut conn: PoolConnection<D::Database>,
    dialect: &D,
    in_transaction: bool,
    broken: bool,
    client_id: Uuid,
) -> DbResult<()> {
    let mut failure = None;
    if in_transaction && !broken {
        warn!(client_id = %client_id, "Releasing client with an open transaction, rolling back");
        if let Err(e) = dialect.raw_execute(&mut *conn, "ROLLBACK", &[]).await {
            failure = Some(format!("rollback on release failed: {}", e));
        }
    }

    if !broken && failure.is_none() {
        drop(conn);
        return Ok(());
    }

    // State unknown: close it so nobody else inherits an open transaction
    let close_result = conn.detach().close().await;
    match (failure, close_result) {
        (None, Ok(())) => Ok(()),
        (Some(message), Ok(())) => Err(DbError::release(format!(
            "{}; connection discarded",
            message
        ))),
        (None, Err(e)) => Err(DbError::release(format!(
            "failed to close discarded connection: {}",
            e
        ))),
        (Some(message), Err(e)) => Err(DbError::release(format!(
            "{}; failed to close connection: {}",
            message, e
        ))),
    }
}

impl<D: Dialect> Drop for DatabaseClient<D> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        let permit = self.permit.take();
        let dialect = Arc::clone(&self.dialect);
        let in_transaction = self.state == TransactionState::InTransaction;
        let broken = self.broken;
        let client_id = self.id;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let result = return_connection(
                        conn,
                        dialect.as_ref(),
                        in_transaction,
                        broken,
                        client_id,
                    )
                    .await;
                    drop(permit);
                    match result {
                        Ok(()) => warn!(
                            client_id = %client_id,
                            "Client released via Drop - consider using explicit release()"
                        ),
                        Err(e) => error!(
                            client_id = %client_id,
                            error = %e,
                            "Failed to release client dropped without release()"
                        ),
                    }
                });
            }
            Err(_) => {
                // No runtime to roll back on; closing the socket ends any open transaction
                if in_transaction || broken {
                    drop(conn.detach());
                } else {
                    drop(conn);
                }
                drop(permit);
                warn!(
                    client_id = %client_id,
                    "Client dropped outside a runtime without release()"
                );
            }
        }
    }
}
