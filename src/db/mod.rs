//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The single-connection session and its scoped transactions
//! - Statement execution, optionally time-bounded
//! - Schema introspection
//! - Type mappings and row decoding
//! - Database dispatch macros for reducing code duplication

pub mod executor;
#[macro_use]
pub mod macros;
pub mod params;
pub mod pool;
pub mod schema;
pub mod transaction;
pub mod types;

pub use executor::QueryExecutor;
pub use pool::{DbPool, Session};
pub use schema::SchemaInspector;
pub use transaction::SessionTx;
pub use types::{TypeCategory, categorize_type};
