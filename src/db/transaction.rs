//! Scoped transactions on the session connection.
//!
//! A `SessionTx` holds the session's only connection until it is committed or
//! rolled back. Dropping it without `commit` rolls back, so a multi-statement
//! save either lands completely or not at all.
//!
//! While a `SessionTx` is alive every statement must go through it; the pool
//! has no second connection to hand out.

use crate::db::executor::{
    empty_result, log_failure, log_statement, postgres, process_rows, sqlite, within,
};
use crate::db::pool::DbPool;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, ExecuteResult, ResultSet, Statement};
use sqlx::{Postgres, Sqlite, Transaction};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Database-specific transaction wrapper.
pub enum SessionTx {
    /// PostgreSQL transaction
    Postgres(Transaction<'static, Postgres>, Option<Duration>),
    /// SQLite transaction
    SQLite(Transaction<'static, Sqlite>, Option<Duration>),
}

impl std::fmt::Debug for SessionTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTx")
            .field("db_type", &self.db_type())
            .finish()
    }
}

impl SessionTx {
    /// Begin a transaction on the pool's connection.
    pub async fn begin(pool: &DbPool, query_timeout: Option<Duration>) -> DbResult<Self> {
        let tx = match pool {
            DbPool::Postgres(p) => SessionTx::Postgres(
                within(query_timeout, "begin transaction", p.begin()).await?,
                query_timeout,
            ),
            DbPool::SQLite(p) => SessionTx::SQLite(
                within(query_timeout, "begin transaction", p.begin()).await?,
                query_timeout,
            ),
        };
        debug!(db_type = %tx.db_type(), "Transaction started");
        Ok(tx)
    }

    /// Get the database type for this transaction.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            SessionTx::Postgres(..) => DatabaseType::PostgreSQL,
            SessionTx::SQLite(..) => DatabaseType::SQLite,
        }
    }

    /// Run a write statement inside the transaction.
    pub async fn execute(&mut self, statement: &Statement) -> DbResult<ExecuteResult> {
        let start = Instant::now();
        log_statement(statement, "Executing statement in transaction");

        let result = impl_tx_dispatch!(self, {
            Postgres(tx, t) => postgres::execute(&mut **tx, statement, *t).await,
            SQLite(tx, t) => sqlite::execute(&mut **tx, statement, *t).await,
        });

        match result {
            Ok(rows_affected) => Ok(ExecuteResult {
                rows_affected,
                execution_time_ms: start.elapsed().as_millis() as u64,
            }),
            Err(e) => {
                log_failure(statement, &e);
                Err(e)
            }
        }
    }

    /// Run a statement that returns rows (e.g. `INSERT ... RETURNING`)
    /// inside the transaction.
    pub async fn fetch(&mut self, statement: &Statement) -> DbResult<ResultSet> {
        let start = Instant::now();
        log_statement(statement, "Executing query in transaction");

        let result = match self {
            SessionTx::Postgres(tx, t) => {
                match postgres::fetch_rows(&mut **tx, statement, *t).await {
                    Ok(rows) if rows.is_empty() => {
                        postgres::describe_columns(&mut **tx, &statement.sql, *t)
                            .await
                            .map(|columns| empty_result(columns, start))
                    }
                    Ok(rows) => Ok(process_rows(rows, start)),
                    Err(e) => Err(e),
                }
            }
            SessionTx::SQLite(tx, t) => {
                match sqlite::fetch_rows(&mut **tx, statement, *t).await {
                    Ok(rows) if rows.is_empty() => {
                        sqlite::describe_columns(&mut **tx, &statement.sql, *t)
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

    /// Commit the transaction.
    pub async fn commit(self) -> DbResult<()> {
        let result = impl_tx_dispatch!(self, {
            Postgres(tx, _t) => tx.commit().await.map_err(DbError::from),
            SQLite(tx, _t) => tx.commit().await.map_err(DbError::from),
        });
        debug!(ok = result.is_ok(), "Transaction committed");
        result
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> DbResult<()> {
        let result = impl_tx_dispatch!(self, {
            Postgres(tx, _t) => tx.rollback().await.map_err(DbError::from),
            SQLite(tx, _t) => tx.rollback().await.map_err(DbError::from),
        });
        debug!(ok = result.is_ok(), "Transaction rolled back");
        result
    }

    /// Roll back after `cause` and hand `cause` back. A failing rollback is
    /// only logged; the statement's own error is what the user sees.
    pub async fn abort(self, cause: DbError) -> DbError {
        if let Err(rollback_err) = self.rollback().await {
            warn!(error = %rollback_err, cause = %cause, "Rollback failed");
        }
        cause
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryParam;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> DbPool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        DbPool::SQLite(pool)
    }

    async fn count(pool: &DbPool) -> i64 {
        match pool {
            DbPool::SQLite(p) => sqlx::query_scalar("SELECT COUNT(*) FROM t")
                .fetch_one(p)
                .await
                .unwrap(),
            DbPool::Postgres(_) => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let pool = memory_pool().await;
        let mut tx = SessionTx::begin(&pool, None).await.unwrap();
        let stmt = Statement::with_params(
            "INSERT INTO t (name) VALUES (?)",
            vec![QueryParam::String("Rex".into())],
        );
        let result = tx.execute(&stmt).await.unwrap();
        assert_eq!(result.rows_affected, 1);
        tx.commit().await.unwrap();
        assert_eq!(count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let pool = memory_pool().await;
        {
            let mut tx = SessionTx::begin(&pool, None).await.unwrap();
            let stmt = Statement::with_params(
                "INSERT INTO t (name) VALUES (?)",
                vec![QueryParam::String("Rex".into())],
            );
            tx.execute(&stmt).await.unwrap();
        }
        assert_eq!(count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_fetch_returning() {
        let pool = memory_pool().await;
        let mut tx = SessionTx::begin(&pool, None).await.unwrap();
        let stmt = Statement::with_params(
            "INSERT INTO t (name) VALUES (?) RETURNING id",
            vec![QueryParam::String("Rex".into())],
        );
        let rs = tx.fetch(&stmt).await.unwrap();
        assert_eq!(rs.columns, vec!["id"]);
        assert_eq!(rs.rows[0][0], serde_json::json!(1));
        tx.rollback().await.unwrap();
        assert_eq!(count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_failed_statement_is_reported() {
        let pool = memory_pool().await;
        let mut tx = SessionTx::begin(&pool, None).await.unwrap();
        let stmt = Statement::with_params("INSERT INTO t (name) VALUES (?)", vec![QueryParam::Null]);
        let err = tx.execute(&stmt).await.unwrap_err();
        assert!(matches!(err, DbError::Database { .. }));
    }

    #[tokio::test]
    async fn test_abort_returns_cause_when_rollback_fails() {
        let pool = memory_pool().await;
        let mut tx = SessionTx::begin(&pool, None).await.unwrap();
        tx.execute(&Statement::with_params(
            "INSERT INTO t (name) VALUES (?)",
            vec![QueryParam::String("Rex".into())],
        ))
        .await
        .unwrap();
        // Ends the transaction behind sqlx's back, so the rollback below fails.
        tx.execute(&Statement::new("ROLLBACK")).await.unwrap();

        let err = tx.abort(DbError::validation("Mark must be 1-12")).await;
        assert!(err.is_validation());
        assert!(err.to_string().contains("Mark must be 1-12"));
        assert_eq!(count(&pool).await, 0);
    }
}
