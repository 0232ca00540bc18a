//! Connection-related data models.
//!
//! This module defines the supported backends and the options a backend needs to
//! open its connection pool.

use crate::config::PoolOptions;
use serde::{Deserialize, Serialize};

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Options a backend needs to open its pool.
///
/// For SQLite, `database` is the file path and the network fields are ignored.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionOptions {
    #[serde(default)]
    pub address: String,
    /// Default: the backend's standard port
    #[serde(default)]
    pub port: Option<u16>,
    pub database: String,
    #[serde(default, alias = "user_name")]
    pub user_name: String,
    /// Contains sensitive data - never log
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub pool: PoolOptions,
}

impl ConnectionOptions {
    /// Create options for a networked backend.
    pub fn new(
        address: impl Into<String>,
        database: impl Into<String>,
        user_name: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            port: None,
            database: database.into(),
            user_name: user_name.into(),
            password: password.into(),
            pool: PoolOptions::default(),
        }
    }

    /// Create options for a SQLite database file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            database: path.into(),
            ..Self::default()
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the pool options.
    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }

    /// Port to connect to, falling back to the backend's default.
    pub fn port_or_default(&self, db_type: DatabaseType) -> u16 {
        self.port
            .or_else(|| db_type.default_port())
            .unwrap_or_default()
    }

    /// Validate the options for the given backend.
    pub fn validate(&self, db_type: DatabaseType) -> Result<(), ConnectionConfigError> {
        if self.database.is_empty() {
            return Err(ConnectionConfigError::MissingDatabase);
        }
        if db_type != DatabaseType::SQLite && self.address.is_empty() {
            return Err(ConnectionConfigError::MissingAddress(db_type));
        }
        self.pool
            .validate()
            .map_err(ConnectionConfigError::InvalidPool)
    }

    /// Get a display-safe description of the target (credentials masked).
    pub fn masked(&self, db_type: DatabaseType) -> String {
        match db_type {
            DatabaseType::SQLite => format!("sqlite:{}", self.database),
            _ => format!(
                "{}://{}:****@{}:{}/{}",
                db_type.display_name().to_lowercase(),
                self.user_name,
                self.address,
                self.port_or_default(db_type),
                self.database
            ),
        }
    }
}

impl std::fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user_name", &self.user_name)
            .field("password", &"****")
            .field("pool", &self.pool)
            .finish()
    }
}

/// Errors that can occur when validating connection options.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionConfigError {
    /// No database name (or SQLite file path) was given
    #[error("Database name cannot be empty")]
    MissingDatabase,

    /// Networked backends need a host
    #[error("{0} requires a server address")]
    MissingAddress(DatabaseType),

    /// Pool options are inconsistent
    #[error("Invalid pool options: {0}")]
    InvalidPool(String),
}

impl From<ConnectionConfigError> for crate::error::DbError {
    fn from(err: ConnectionConfigError) -> Self {
        crate::error::DbError::configuration(err.to_string())
    }
}
