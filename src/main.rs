//! dbscope - Main entry point.
//!
//! Runs one named-parameter statement against MySQL, PostgreSQL or SQLite and
//! prints the result as JSON.

use dbscope::config::{Config, DatabaseConfig, RunMode};
use dbscope::db::translator::{Quoting, parameter_names_with};
use dbscope::db::{DatabaseClient, DatabaseProvider, Dialect};
use dbscope::error::{DbError, DbResult};
use dbscope::models::{DatabaseType, NamedArgs, SqlValue};
use dbscope::{MySqlDialect, PostgresDialect, SqliteDialect};
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // stdout carries the result; logs go to stderr
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// The statement to run, with its arguments bound one way or the other.
struct Statement {
    sql: String,
    mode: RunMode,
    args: Arguments,
}

enum Arguments {
    Named(NamedArgs),
    Positional(Vec<SqlValue>),
}

impl Statement {
    fn from_config(config: &Config, db_type: DatabaseType) -> DbResult<Self> {
        let params = config.parsed_params().map_err(DbError::configuration)?;

        let args = if config.positional {
            if config.mode == RunMode::Page {
                return Err(DbError::configuration(
                    "page mode needs named parameters; drop --positional",
                ));
            }
            Arguments::Positional(
                params
                    .iter()
                    .map(|(_, raw)| SqlValue::parse_loose(raw))
                    .collect(),
            )
        } else {
            let mut named: NamedArgs = params
                .iter()
                .map(|(name, raw)| (name.as_str(), SqlValue::parse_loose(raw)))
                .collect();
            let referenced = parameter_names_with(&config.sql, Quoting::for_database(db_type));
            for (name, _) in &params {
                let paging = config.mode == RunMode::Page
                    && matches!(name.as_str(), "limit" | "offset");
                if !paging && !referenced.contains(&name.as_str()) {
                    warn!(param = %name, "Parameter is not referenced by the SQL");
                }
            }
            if config.mode == RunMode::Page {
                if let Some(limit) = config.limit {
                    named.insert("limit", page_bound("limit", limit)?);
                }
                if let Some(offset) = config.offset {
                    named.insert("offset", page_bound("offset", offset)?);
                }
            }
            Arguments::Named(named)
        };

        Ok(Self {
            sql: config.sql.clone(),
            mode: config.mode,
            args,
        })
    }

    /// Run through the provider's one-shot operations.
    async fn run<D: Dialect>(&self, provider: &DatabaseProvider<D>) -> DbResult<JsonValue> {
        match (&self.args, self.mode) {
            (Arguments::Named(args), RunMode::Execute) => {
                to_json(&provider.execute(&self.sql, args).await?)
            }
            (Arguments::Named(args), RunMode::Page) => {
                to_json(&provider.query_page(&self.sql, args).await?)
            }
            (Arguments::Named(args), RunMode::One) => {
                to_json(&provider.query_one(&self.sql, args).await?)
            }
            (Arguments::Positional(args), RunMode::One) => {
                to_json(&provider.query_one_positional(&self.sql, args).await?)
            }
            (Arguments::Positional(args), _) => {
                to_json(&provider.execute_positional(&self.sql, args).await?)
            }
        }
    }

    /// Run on a held client.
    async fn run_on<D: Dialect>(&self, client: &mut DatabaseClient<D>) -> DbResult<JsonValue> {
        match (&self.args, self.mode) {
            (Arguments::Named(args), RunMode::Execute) => {
                to_json(&client.execute(&self.sql, args).await?)
            }
            (Arguments::Named(args), RunMode::Page) => {
                to_json(&client.query_page(&self.sql, args).await?)
            }
            (Arguments::Named(args), RunMode::One) => {
                to_json(&client.query_one(&self.sql, args).await?)
            }
            (Arguments::Positional(args), RunMode::One) => {
                to_json(&client.query_one_positional(&self.sql, args).await?)
            }
            (Arguments::Positional(args), _) => {
                to_json(&client.execute_positional(&self.sql, args).await?)
            }
        }
    }

    /// Run inside a transaction that is rolled back whatever happens.
    async fn dry_run<D: Dialect>(&self, provider: &DatabaseProvider<D>) -> DbResult<JsonValue> {
        let mut client = provider.get_client().await?;
        let result = match client.begin_transaction().await {
            Ok(()) => {
                let output = self.run_on(&mut client).await;
                let rollback = client.rollback().await;
                output.and_then(|value| rollback.map(|()| value))
            }
            Err(e) => Err(e),
        };
        let release = client.release().await;
        let output = result?;
        release?;
        Ok(output)
    }
}

fn page_bound(name: &str, value: u64) -> DbResult<i64> {
    i64::try_from(value)
        .map_err(|_| DbError::configuration(format!("--{} {} is out of range", name, value)))
}

fn to_json<T: serde::Serialize>(value: &T) -> DbResult<JsonValue> {
    serde_json::to_value(value).map_err(|e| DbError::decode(e.to_string()))
}

async fn run_with<D: Dialect>(
    provider: DatabaseProvider<D>,
    statement: &Statement,
    dry_run: bool,
) -> DbResult<JsonValue> {
    let result = if dry_run {
        statement.dry_run(&provider).await
    } else {
        statement.run(&provider).await
    };
    provider.close().await;
    result
}

async fn run(config: &Config) -> DbResult<JsonValue> {
    let db_config = DatabaseConfig::parse(&config.database).map_err(DbError::configuration)?;
    let db_type = DatabaseType::from_connection_string(&db_config.connection_string)
        .ok_or_else(|| {
            DbError::configuration(format!("Unknown database type for: {}", db_config.id))
        })?;
    let statement = Statement::from_config(config, db_type)?;

    info!(
        id = %db_config.id,
        db_type = %db_type,
        mode = %config.mode,
        dry_run = config.dry_run,
        "Running statement"
    );

    let url = &db_config.connection_string;
    let pool = &db_config.pool_options;
    match db_type {
        DatabaseType::MySQL => {
            let provider = MySqlDialect::connect_url(url, pool).await?;
            run_with(provider, &statement, config.dry_run).await
        }
        DatabaseType::PostgreSQL => {
            let provider = PostgresDialect::connect_url(url, pool).await?;
            run_with(provider, &statement, config.dry_run).await
        }
        DatabaseType::SQLite => {
            let provider = SqliteDialect::connect_url(url, pool).await?;
            run_with(provider, &statement, config.dry_run).await
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::parse_args();
    init_tracing(&config);

    match run(&config).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!(error = %e, "Statement failed");
            eprintln!("Error: {}", e);
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn page_config(extra: &[&str]) -> Config {
        let mut args = vec![
            "dbscope",
            "-d",
            "sqlite:x.db",
            "-s",
            "SELECT * FROM t",
            "--mode",
            "page",
        ];
        args.extend_from_slice(extra);
        Config::parse_from(args)
    }

    #[test]
    fn test_page_bounds_become_named_args() {
        let config = page_config(&["--limit", "10", "--offset", "20"]);
        let statement = Statement::from_config(&config, DatabaseType::SQLite).unwrap();
        match statement.args {
            Arguments::Named(args) => {
                assert_eq!(args.get("limit"), Some(&SqlValue::Int(10)));
                assert_eq!(args.get("offset"), Some(&SqlValue::Int(20)));
            }
            Arguments::Positional(_) => panic!("expected named arguments"),
        }
    }

    #[test]
    fn test_page_bound_overflow_is_rejected() {
        let config = page_config(&["--limit", "18446744073709551615"]);
        let err = Statement::from_config(&config, DatabaseType::SQLite)
            .err()
            .unwrap();
        assert!(matches!(err, DbError::Configuration { .. }));

        let config = page_config(&["--offset", "9223372036854775808"]);
        assert!(Statement::from_config(&config, DatabaseType::SQLite).is_err());
        assert_eq!(page_bound("limit", i64::MAX as u64).unwrap(), i64::MAX);
    }

    #[test]
    fn test_page_mode_rejects_positional() {
        let config = page_config(&["--positional"]);
        assert!(Statement::from_config(&config, DatabaseType::MySQL).is_err());
    }
}
