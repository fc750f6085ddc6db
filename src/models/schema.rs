//! Schema-related data models.
//!
//! This module defines the table descriptor read from the database catalog
//! each time a form, filter or search needs the shape of a table.

use crate::db::types::{TypeCategory, categorize_type};
use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};

/// Tables the kennel application browses, in menu order.
pub const KENNEL_TABLES: [&str; 6] = [
    "Breeds",
    "Dogs",
    "Parents",
    "Exhibitions",
    "Medicine_book",
    "Medicine_history",
];

/// Resolve a user-typed table name to its canonical spelling.
pub fn kennel_table(name: &str) -> Option<&'static str> {
    KENNEL_TABLES
        .iter()
        .copied()
        .find(|t| t.eq_ignore_ascii_case(name.trim()))
}

/// Check that `name` can be spliced into SQL as a bare identifier.
///
/// Table and column names are never bound as parameters, so anything that
/// reaches a statement text must pass this check first.
pub fn validate_identifier(name: &str) -> DbResult<&str> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(name)
    } else {
        Err(DbError::validation(format!(
            "'{}' is not a valid table or column name",
            name
        )))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Catalog type label (e.g., `integer`, `character varying`, `date`)
    pub data_type: String,
    /// Underlying type name usable in a cast (PostgreSQL `udt_name`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udt_name: Option<String>,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    /// Value supplied by the database (serial, identity, rowid alias)
    pub is_generated: bool,
}

impl ColumnDefinition {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            udt_name: None,
            nullable,
            default_value: None,
            is_primary_key: false,
            is_generated: false,
        }
    }

    /// Set whether this is a primary key column.
    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    /// Set the default expression as reported by the catalog.
    pub fn with_default_str(mut self, default_str: &str) -> Self {
        self.default_value = Some(default_str.to_string());
        self
    }

    /// Set the underlying type name.
    pub fn with_udt_name(mut self, udt_name: impl Into<String>) -> Self {
        self.udt_name = Some(udt_name.into());
        self
    }

    /// Mark the column as database-generated.
    pub fn with_generated(mut self, generated: bool) -> Self {
        self.is_generated = generated;
        self
    }

    /// Logical category of the declared type.
    pub fn category(&self) -> TypeCategory {
        categorize_type(&self.data_type)
    }

    /// True for integer and numeric columns.
    pub fn is_numeric(&self) -> bool {
        let lower = self.data_type.to_lowercase();
        lower.contains("int") || lower.contains("numeric") || lower.contains("serial")
    }

    /// True for character columns searched by free-text search.
    pub fn is_textual(&self) -> bool {
        self.category() == TypeCategory::Text
    }

    /// Type to cast a text parameter into before storing it in this column.
    ///
    /// `None` for textual columns, which accept text parameters as-is.
    pub fn cast_target(&self) -> Option<&str> {
        if self.is_textual() {
            return None;
        }
        self.udt_name
            .as_deref()
            .filter(|udt| validate_identifier(udt).is_ok())
    }
}

/// Ordered column list of one table, read fresh from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub table_name: String,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDescriptor {
    /// Create a new table descriptor.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
        }
    }

    /// Add a column definition.
    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Look up a column by name (case-insensitive, catalog names are folded).
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Names of the textual columns, in ordinal order.
    pub fn text_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_textual())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dogs() -> TableDescriptor {
        TableDescriptor::new("dogs")
            .with_column(
                ColumnDefinition::new("id_dog", "integer", false)
                    .with_primary_key(true)
                    .with_generated(true)
                    .with_udt_name("int4"),
            )
            .with_column(ColumnDefinition::new("owner", "character varying", false))
            .with_column(ColumnDefinition::new("gender", "character", false))
            .with_column(
                ColumnDefinition::new("birthday", "date", true).with_udt_name("date"),
            )
            .with_column(ColumnDefinition::new("alive", "boolean", false))
    }

    #[test]
    fn test_kennel_table_lookup() {
        assert_eq!(kennel_table("dogs"), Some("Dogs"));
        assert_eq!(kennel_table(" MEDICINE_BOOK "), Some("Medicine_book"));
        assert_eq!(kennel_table("owners"), None);
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("id_dog").is_ok());
        assert!(validate_identifier("_x1").is_ok());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("owner; DROP TABLE dogs").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_descriptor_queries() {
        let table = dogs();
        assert_eq!(table.text_columns(), vec!["owner", "gender"]);
        assert!(table.column("OWNER").is_some());
        assert!(table.column("id_dog").unwrap().is_numeric());
    }

    #[test]
    fn test_cast_target() {
        let table = dogs();
        assert_eq!(table.column("birthday").unwrap().cast_target(), Some("date"));
        assert_eq!(table.column("owner").unwrap().cast_target(), None);
        assert_eq!(table.column("alive").unwrap().cast_target(), None);
    }
}
