//! Kennel database client.
//!
//! Browse, filter, add and delete records of a dog-breeding kennel's
//! database, and run the breeding, elite-breeding and service-dog reports.
//! PostgreSQL is the production backend; SQLite serves local files and tests.

pub mod browser;
pub mod config;
pub mod console;
pub mod db;
pub mod error;
pub mod export;
pub mod filter;
pub mod forms;
pub mod models;
pub mod reports;
