//! Query execution engine.
//!
//! This module provides statement execution with support for:
//! - Parameterized statements
//! - Optional statement timeouts (statements run to completion by default)
//! - Full materialization of result sets (no paging)
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `postgres`: PostgreSQL-specific query and write operations
//! - `sqlite`: SQLite-specific query and write operations
//!
//! Both are generic over the sqlx executor, so the same code serves the
//! session pool and an open transaction.

use crate::db::pool::DbPool;
use crate::db::types::RowToCells;
use crate::error::{DbError, DbResult};
use crate::models::{ResultSet, Statement};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error};

/// Query executor that handles statement execution against the pool.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    timeout: Option<Duration>,
}

impl QueryExecutor {
    /// Create a query executor. Without `timeout_secs` statements are not
    /// bounded.
    pub fn with_timeout(timeout_secs: Option<u64>) -> Self {
        Self {
            timeout: timeout_secs.map(|secs| Duration::from_secs(secs.max(1))),
        }
    }

    /// Statement timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Execute a read statement and return every row.
    pub async fn fetch_all(&self, pool: &DbPool, statement: &Statement) -> DbResult<ResultSet> {
        let start = Instant::now();
        log_statement(statement, "Executing query");

        let result = match pool {
            DbPool::Postgres(p) => {
                let rows = postgres::fetch_rows(p, statement, self.timeout).await;
                match rows {
                    Ok(rows) if rows.is_empty() => {
                        postgres::describe_columns(p, &statement.sql, self.timeout)
                            .await
                            .map(|columns| empty_result(columns, start))
                    }
                    Ok(rows) => Ok(process_rows(rows, start)),
                    Err(e) => Err(e),
                }
            }
            DbPool::SQLite(p) => {
                let rows = sqlite::fetch_rows(p, statement, self.timeout).await;
                match rows {
                    Ok(rows) if rows.is_empty() => {
                        sqlite::describe_columns(p, &statement.sql, self.timeout)
                            .await
                            .map(|columns| empty_result(columns, start))
                    }
                    Ok(rows) => Ok(process_rows(rows, start)),
                    Err(e) => Err(e),
                }
            }
        };

        if let Err(e) = &result {
            log_failure(statement, e);
        }
        result
    }
}

/// Process rows from any database type into a ResultSet.
pub(crate) fn process_rows<R: RowToCells>(rows: Vec<R>, start: Instant) -> ResultSet {
    let columns = rows
        .first()
        .map(|r| r.column_names())
        .unwrap_or_default();
    let cells = rows.iter().map(|r| r.to_cells()).collect();

    ResultSet {
        columns,
        rows: cells,
        execution_time_ms: start.elapsed().as_millis() as u64,
    }
}

pub(crate) fn empty_result(columns: Vec<String>, start: Instant) -> ResultSet {
    ResultSet {
        columns,
        rows: Vec::new(),
        execution_time_ms: start.elapsed().as_millis() as u64,
    }
}

pub(crate) fn log_statement(statement: &Statement, message: &str) {
    debug!(
        sql = %statement.sql,
        params = statement.params.len(),
        "{}", message
    );
}

/// Full diagnostic record of a failed statement.
pub(crate) fn log_failure(statement: &Statement, err: &DbError) {
    let params: Vec<String> = statement.params.iter().map(|p| p.to_string()).collect();
    error!(
        error = %err,
        sql = %statement.sql,
        params = ?params,
        "Statement failed"
    );
}

/// Await a sqlx future, bounded by `limit` when one is configured.
pub(crate) async fn within<F, T>(limit: Option<Duration>, operation: &str, fut: F) -> DbResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match limit {
        None => fut.await.map_err(DbError::from),
        Some(limit) => match timeout(limit, fut).await {
            Ok(result) => result.map_err(DbError::from),
            Err(_) => Err(DbError::timeout(operation, limit.as_secs() as u32)),
        },
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

pub(crate) mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use sqlx::postgres::PgRow;
    use sqlx::{Column, Executor, Postgres};

    pub async fn fetch_rows<'e, E>(
        executor: E,
        statement: &'e Statement,
        query_timeout: Option<Duration>,
    ) -> DbResult<Vec<PgRow>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = bind_postgres_param(query, param);
        }

        within(query_timeout, "query execution", query.fetch_all(executor)).await
    }

    pub async fn describe_columns<'e, E>(
        executor: E,
        sql: &'e str,
        query_timeout: Option<Duration>,
    ) -> DbResult<Vec<String>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let describe = within(query_timeout, "statement describe", executor.describe(sql)).await?;
        Ok(describe
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }

    pub async fn execute<'e, E>(
        executor: E,
        statement: &'e Statement,
        query_timeout: Option<Duration>,
    ) -> DbResult<u64>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = bind_postgres_param(query, param);
        }

        within(query_timeout, "write operation", query.execute(executor))
            .await
            .map(|r| r.rows_affected())
    }
}

pub(crate) mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::sqlite::SqliteRow;
    use sqlx::{Column, Executor, Sqlite};

    pub async fn fetch_rows<'e, E>(
        executor: E,
        statement: &'e Statement,
        query_timeout: Option<Duration>,
    ) -> DbResult<Vec<SqliteRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = bind_sqlite_param(query, param);
        }

        within(query_timeout, "query execution", query.fetch_all(executor)).await
    }

    pub async fn describe_columns<'e, E>(
        executor: E,
        sql: &'e str,
        query_timeout: Option<Duration>,
    ) -> DbResult<Vec<String>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let describe = within(query_timeout, "statement describe", executor.describe(sql)).await?;
        Ok(describe
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }

    pub async fn execute<'e, E>(
        executor: E,
        statement: &'e Statement,
        query_timeout: Option<Duration>,
    ) -> DbResult<u64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = bind_sqlite_param(query, param);
        }

        within(query_timeout, "write operation", query.execute(executor))
            .await
            .map(|r| r.rows_affected())
    }
}
