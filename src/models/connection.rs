//! Connection-related data models.
//!
//! This module defines the supported database backends, their SQL dialect
//! differences, and the connection configuration handed to the session.

use serde::{Deserialize, Serialize};
use url::Url;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
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
            Self::SQLite => "SQLite",
        }
    }

    /// Positional placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::PostgreSQL => format!("${}", index),
            Self::SQLite => "?".to_string(),
        }
    }

    /// Placeholder that casts a text parameter to the column's declared type.
    ///
    /// PostgreSQL refuses implicit text-to-date or text-to-enum assignment for
    /// typed parameters, so the cast is spelled out. SQLite stores any value in
    /// any column and needs no cast.
    pub fn cast_placeholder(&self, index: usize, target_type: Option<&str>) -> String {
        match (self, target_type) {
            (Self::PostgreSQL, Some(ty)) => format!("CAST(${} AS {})", index, ty),
            _ => self.placeholder(index),
        }
    }

    /// Case-insensitive substring predicate against the text form of `column`.
    pub fn text_match(&self, column: &str, placeholder: &str) -> String {
        match self {
            Self::PostgreSQL => format!("{}::text ILIKE {}", column, placeholder),
            Self::SQLite => format!("CAST({} AS TEXT) LIKE {}", column, placeholder),
        }
    }

    /// Exact equality against the text form of `column`.
    ///
    /// Used for enumerated domains, which may be declared as enum, char or
    /// varchar columns depending on the schema.
    pub fn text_equals(&self, column: &str, placeholder: &str) -> String {
        match self {
            Self::PostgreSQL => format!("{}::text = {}", column, placeholder),
            Self::SQLite => format!("CAST({} AS TEXT) = {}", column, placeholder),
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Configuration for the kennel database connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub db_type: DatabaseType,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub connection_string: String,
    /// Seconds to wait for the initial connection.
    pub connect_timeout_secs: u64,
    /// Per-statement timeout in seconds; `None` lets statements run to completion.
    pub query_timeout_secs: Option<u64>,
}

impl ConnectionConfig {
    /// Create a new connection configuration.
    pub fn new(connection_string: impl Into<String>) -> Result<Self, ConnectionConfigError> {
        let connection_string = connection_string.into();

        let db_type = DatabaseType::from_connection_string(&connection_string)
            .ok_or_else(|| ConnectionConfigError::UnknownDatabaseType(mask(&connection_string)))?;

        Ok(Self {
            db_type,
            connection_string,
            connect_timeout_secs: crate::config::DEFAULT_CONNECT_TIMEOUT_SECS,
            query_timeout_secs: None,
        })
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Bound every statement by `secs`.
    pub fn with_query_timeout(mut self, secs: Option<u64>) -> Self {
        self.query_timeout_secs = secs;
        self
    }

    /// Get a display-safe version of the connection string (credentials masked).
    pub fn masked_connection_string(&self) -> String {
        mask(&self.connection_string)
    }
}

fn mask(connection_string: &str) -> String {
    match Url::parse(connection_string) {
        Ok(mut url) if url.password().is_some() => match url.set_password(Some("****")) {
            Ok(()) => url.to_string(),
            Err(()) => mask_userinfo(connection_string),
        },
        Ok(_) => connection_string.to_string(),
        Err(_) => mask_userinfo(connection_string),
    }
}

/// Fallback for strings `Url` cannot parse: hide everything between the
/// scheme and the last `@`.
fn mask_userinfo(connection_string: &str) -> String {
    match (connection_string.find("://"), connection_string.rfind('@')) {
        (Some(scheme_end), Some(at_pos)) if scheme_end + 3 <= at_pos => format!(
            "{}****{}",
            &connection_string[..scheme_end + 3],
            &connection_string[at_pos..]
        ),
        _ => connection_string.to_string(),
    }
}

/// Errors that can occur when creating a connection configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionConfigError {
    /// Could not determine database type from connection string
    #[error("Unknown database type in connection string: {0}")]
    UnknownDatabaseType(String),
}

/// Information about the open connection, returned after connecting.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub database_type: DatabaseType,
    pub server_version: Option<String>,
}
