//! Data models for the kennel database client.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionConfigError, ConnectionInfo, DatabaseType};
pub use query::{ExecuteResult, QueryParam, ResultSet, SortDirection, Statement, cell_text};
pub use schema::{
    ColumnDefinition, KENNEL_TABLES, TableDescriptor, kennel_table, validate_identifier,
};
