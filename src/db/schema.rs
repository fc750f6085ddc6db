//! Schema introspection module.
//!
//! Reads table descriptors and primary keys from the database catalog for
//! SQLite and PostgreSQL. Nothing here is cached: every form, filter and
//! search asks the catalog again.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! database type. Database-specific implementations are in their respective
//! submodules (postgres, sqlite), each providing the same interface.

use crate::db::pool::DbPool;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnDefinition, TableDescriptor, validate_identifier};
use tracing::debug;

/// Primary key name assumed when the catalog reports none.
pub const FALLBACK_PRIMARY_KEY: &str = "id";

/// Schema inspector for database introspection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// Describe a table's columns in ordinal order.
    ///
    /// An unknown table is a `Schema` error; the caller abandons whatever
    /// form or filter needed the descriptor.
    pub async fn describe_table(pool: &DbPool, table_name: &str) -> DbResult<TableDescriptor> {
        validate_identifier(table_name)?;
        let descriptor = match pool {
            DbPool::Postgres(p) => postgres::describe_table(p, table_name).await?,
            DbPool::SQLite(p) => sqlite::describe_table(p, table_name).await?,
        };

        if descriptor.columns.is_empty() {
            return Err(DbError::schema(
                format!("Table '{}' not found", table_name),
                table_name.to_string(),
            ));
        }

        debug!(
            table = %table_name,
            columns = descriptor.columns.len(),
            "Described table"
        );
        Ok(descriptor)
    }

    /// Name of the table's primary key column, or `"id"` when the catalog has
    /// no `PRIMARY KEY` constraint for it.
    pub async fn primary_key_column(pool: &DbPool, table_name: &str) -> DbResult<String> {
        validate_identifier(table_name)?;
        let pk = match pool {
            DbPool::Postgres(p) => postgres::primary_key_column(p, table_name).await?,
            DbPool::SQLite(p) => sqlite::primary_key_column(p, table_name).await?,
        };

        Ok(pk.unwrap_or_else(|| {
            debug!(table = %table_name, "No primary key constraint, assuming 'id'");
            FALLBACK_PRIMARY_KEY.to_string()
        }))
    }
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        // Unquoted identifiers are folded to lower case in the catalog
        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            c.column_name::text AS column_name,
            c.data_type::text AS data_type,
            c.udt_name::text AS udt_name,
            c.is_nullable::text AS is_nullable,
            c.column_default::text AS column_default,
            c.is_identity::text AS is_identity,
            CASE WHEN pk.column_name IS NOT NULL THEN true ELSE false END AS is_primary_key
        FROM information_schema.columns c
        LEFT JOIN (
            SELECT kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.table_name = lower($1)
            AND tc.table_schema = current_schema()
            AND tc.constraint_type = 'PRIMARY KEY'
        ) pk ON c.column_name = pk.column_name
        WHERE c.table_name = lower($1) AND c.table_schema = current_schema()
        ORDER BY c.ordinal_position
        "#;

        pub const PRIMARY_KEY: &str = r#"
        SELECT kcu.column_name::text
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        WHERE tc.table_name = lower($1)
        AND tc.table_schema = current_schema()
        AND tc.constraint_type = 'PRIMARY KEY'
        ORDER BY kcu.ordinal_position
        LIMIT 1
        "#;
    }

    pub mod sqlite {
        pub fn table_info(table_name: &str) -> String {
            format!("PRAGMA table_info('{}')", table_name)
        }
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    pub async fn describe_table(pool: &PgPool, table_name: &str) -> DbResult<TableDescriptor> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(table_name)
            .fetch_all(pool)
            .await?;

        let mut descriptor = TableDescriptor::new(table_name);
        for row in &rows {
            let name: String = row.try_get("column_name")?;
            let data_type: String = row.try_get("data_type")?;
            let udt_name: String = row.try_get("udt_name")?;
            let nullable: String = row.try_get("is_nullable")?;
            let default_value: Option<String> = row.try_get("column_default")?;
            let is_identity: Option<String> = row.try_get("is_identity")?;
            let is_pk: bool = row.try_get("is_primary_key")?;

            let generated = is_identity.as_deref() == Some("YES")
                || default_value
                    .as_deref()
                    .is_some_and(|d| d.starts_with("nextval("));

            let mut col = ColumnDefinition::new(&name, &data_type, nullable == "YES")
                .with_udt_name(udt_name)
                .with_primary_key(is_pk)
                .with_generated(generated);
            if let Some(ref def) = default_value {
                col = col.with_default_str(def);
            }
            descriptor = descriptor.with_column(col);
        }
        Ok(descriptor)
    }

    pub async fn primary_key_column(pool: &PgPool, table_name: &str) -> DbResult<Option<String>> {
        let pk = sqlx::query_scalar::<_, String>(queries::postgres::PRIMARY_KEY)
            .bind(table_name)
            .fetch_optional(pool)
            .await?;
        Ok(pk)
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    struct PragmaColumn {
        name: String,
        data_type: String,
        notnull: bool,
        default_value: Option<String>,
        pk_position: i32,
    }

    async fn table_info(pool: &SqlitePool, table_name: &str) -> DbResult<Vec<PragmaColumn>> {
        let rows = sqlx::query(&queries::sqlite::table_info(table_name))
            .fetch_all(pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(PragmaColumn {
                    name: row.try_get("name")?,
                    data_type: row.try_get("type")?,
                    notnull: row.try_get::<i32, _>("notnull")? != 0,
                    default_value: row.try_get::<Option<String>, _>("dflt_value")?,
                    pk_position: row.try_get("pk")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(DbError::from)
    }

    pub async fn describe_table(pool: &SqlitePool, table_name: &str) -> DbResult<TableDescriptor> {
        let columns = table_info(pool, table_name).await?;
        let pk_count = columns.iter().filter(|c| c.pk_position > 0).count();

        let mut descriptor = TableDescriptor::new(table_name);
        for c in columns {
            let is_pk = c.pk_position > 0;
            // A lone INTEGER PRIMARY KEY aliases the rowid and is assigned automatically
            let generated = is_pk && pk_count == 1 && c.data_type.eq_ignore_ascii_case("INTEGER");

            let mut col = ColumnDefinition::new(&c.name, &c.data_type, !c.notnull)
                .with_primary_key(is_pk)
                .with_generated(generated);
            if let Some(ref def) = c.default_value {
                col = col.with_default_str(def);
            }
            descriptor = descriptor.with_column(col);
        }
        Ok(descriptor)
    }

    pub async fn primary_key_column(
        pool: &SqlitePool,
        table_name: &str,
    ) -> DbResult<Option<String>> {
        let columns = table_info(pool, table_name).await?;
        Ok(columns
            .into_iter()
            .filter(|c| c.pk_position > 0)
            .min_by_key(|c| c.pk_position)
            .map(|c| c.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool_with(ddl: &str) -> DbPool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(ddl).execute(&pool).await.unwrap();
        DbPool::SQLite(pool)
    }

    #[tokio::test]
    async fn test_describe_sqlite_table() {
        let pool = pool_with(
            "CREATE TABLE Dogs (id_dog INTEGER PRIMARY KEY, owner VARCHAR(50) NOT NULL, \
             birthday DATE, alive BOOLEAN NOT NULL DEFAULT 1)",
        )
        .await;
        let desc = SchemaInspector::describe_table(&pool, "Dogs").await.unwrap();

        assert_eq!(desc.column_names(), vec!["id_dog", "owner", "birthday", "alive"]);
        let id = desc.column("id_dog").unwrap();
        assert!(id.is_primary_key);
        assert!(id.is_generated);
        assert!(!desc.column("owner").unwrap().nullable);
        assert!(desc.column("birthday").unwrap().nullable);
        assert_eq!(
            desc.column("alive").unwrap().default_value.as_deref(),
            Some("1")
        );
        assert_eq!(desc.text_columns(), vec!["owner"]);
    }

    #[tokio::test]
    async fn test_describe_unknown_table_is_schema_error() {
        let pool = pool_with("CREATE TABLE t (x INTEGER)").await;
        let err = SchemaInspector::describe_table(&pool, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Schema { .. }));
    }

    #[tokio::test]
    async fn test_describe_rejects_bad_identifier() {
        let pool = pool_with("CREATE TABLE t (x INTEGER)").await;
        let err = SchemaInspector::describe_table(&pool, "t'; DROP TABLE t")
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_primary_key_from_catalog() {
        let pool = pool_with("CREATE TABLE Breeds (id_breed INTEGER PRIMARY KEY, name TEXT)").await;
        let pk = SchemaInspector::primary_key_column(&pool, "Breeds")
            .await
            .unwrap();
        assert_eq!(pk, "id_breed");
    }

    #[tokio::test]
    async fn test_primary_key_fallback() {
        let pool = pool_with("CREATE TABLE Notes (body TEXT)").await;
        let pk = SchemaInspector::primary_key_column(&pool, "Notes")
            .await
            .unwrap();
        assert_eq!(pk, FALLBACK_PRIMARY_KEY);
    }
}
