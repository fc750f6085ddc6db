//! Filter, search and sort for the record browser.
//!
//! Filters map a column name to a raw user string. At query-build time each
//! entry becomes one predicate, with the operator chosen from the column's
//! declared type when a table descriptor is available and from the value's
//! shape otherwise. Predicates are joined with AND; free-text search ORs a
//! substring match over every textual column.

use crate::error::{DbError, DbResult};
use crate::forms::{DATE_FORMAT, is_bool_token, parse_date};
use crate::models::{
    DatabaseType, QueryParam, SortDirection, Statement, TableDescriptor, validate_identifier,
};
use crate::db::TypeCategory;

/// Gender tokens compared exactly.
pub const GENDER_TOKENS: &[&str] = &["M", "F"];
/// Medal tokens compared exactly.
pub const MEDAL_TOKENS: &[&str] = &["Gold", "Silver", "Bronze"];

fn starts_entry(token: &str) -> bool {
    token.split_once('=').is_some_and(|(column, _)| {
        !column.is_empty() && column.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// True for `id_*` and `*_id` column names.
pub fn is_id_column(column: &str) -> bool {
    let lower = column.to_ascii_lowercase();
    lower.starts_with("id_") || lower.ends_with("_id")
}

fn is_enum_token(value: &str) -> bool {
    GENDER_TOKENS.contains(&value) || MEDAL_TOKENS.contains(&value)
}

/// Column → raw value, in entry order. Empty values are not stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    entries: Vec<(String, String)>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a filter value; an empty value removes the column's filter.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into().trim().to_string();
        self.entries.retain(|(c, _)| !c.eq_ignore_ascii_case(&column));
        if !value.is_empty() {
            self.entries.push((column, value));
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    /// Parse `column=value`.
    pub fn parse_entry(entry: &str) -> DbResult<(String, String)> {
        match entry.split_once('=') {
            Some((column, value)) if !column.trim().is_empty() => {
                Ok((column.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(DbError::validation(format!(
                "Expected COLUMN=VALUE, got '{}'",
                entry
            ))),
        }
    }

    /// Parse a line of `column=value` pairs. A value runs up to the next
    /// `word=` token, so `owner=Anna Petrova gender=F` keeps the full name.
    pub fn parse_line(line: &str) -> DbResult<Self> {
        let mut entries: Vec<String> = Vec::new();
        for token in line.split_whitespace() {
            match entries.last_mut() {
                Some(entry) if !starts_entry(token) => {
                    entry.push(' ');
                    entry.push_str(token);
                }
                _ => entries.push(token.to_string()),
            }
        }

        let mut filters = Self::new();
        for entry in &entries {
            let (column, value) = Self::parse_entry(entry)?;
            filters.insert(column, value);
        }
        Ok(filters)
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(column))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v.as_str()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A fragment of `WHERE` clause with its bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicates {
    pub conditions: Vec<String>,
    pub params: Vec<QueryParam>,
}

impl Predicates {
    fn push(&mut self, condition: String, param: QueryParam) {
        self.conditions.push(condition);
        self.params.push(param);
    }

    fn next_placeholder(&self, dialect: DatabaseType) -> String {
        dialect.placeholder(self.params.len() + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

fn substring(value: &str) -> QueryParam {
    QueryParam::String(format!("%{}%", value))
}

/// Build the conjunctive predicate list for `filters`.
///
/// With a descriptor, filter columns must belong to the table and values are
/// checked against the declared type first. Without one (ad hoc filters) the
/// operator is inferred from the value alone.
pub fn build_predicates(
    dialect: DatabaseType,
    filters: &FilterSet,
    descriptor: Option<&TableDescriptor>,
) -> DbResult<Predicates> {
    let mut predicates = Predicates::default();
    for (column, value) in filters.iter() {
        match descriptor {
            Some(desc) => typed_predicate(dialect, desc, column, value, &mut predicates)?,
            None => {
                validate_identifier(column)?;
                sniffed_predicate(dialect, column, value, &mut predicates);
            }
        }
    }
    Ok(predicates)
}

/// Operator chosen from the value's shape, in fixed priority order.
fn sniffed_predicate(dialect: DatabaseType, column: &str, value: &str, out: &mut Predicates) {
    let ph = out.next_placeholder(dialect);
    if is_bool_token(value) {
        out.push(
            format!("{} = {}", column, ph),
            QueryParam::Bool(value.eq_ignore_ascii_case("TRUE")),
        );
    } else if is_id_column(column) {
        match value.parse::<i64>() {
            Ok(id) => out.push(format!("{} = {}", column, ph), QueryParam::Int(id)),
            Err(_) => out.push(dialect.text_match(column, &ph), substring(value)),
        }
    } else if is_enum_token(value) {
        out.push(
            dialect.text_equals(column, &ph),
            QueryParam::String(value.to_string()),
        );
    } else {
        out.push(dialect.text_match(column, &ph), substring(value));
    }
}

/// Operator chosen from the column's declared type, then the value.
fn typed_predicate(
    dialect: DatabaseType,
    descriptor: &TableDescriptor,
    column: &str,
    value: &str,
    out: &mut Predicates,
) -> DbResult<()> {
    let def = descriptor.column(column).ok_or_else(|| {
        DbError::validation(format!(
            "Table {} has no column '{}'",
            descriptor.table_name, column
        ))
    })?;
    let column = validate_identifier(&def.name)?;
    let ph = out.next_placeholder(dialect);

    match def.category() {
        TypeCategory::Boolean => {
            if !is_bool_token(value) {
                return Err(DbError::validation(format!(
                    "Filter on '{}' accepts only TRUE or FALSE",
                    column
                )));
            }
            out.push(
                format!("{} = {}", column, ph),
                QueryParam::Bool(value.eq_ignore_ascii_case("TRUE")),
            );
        }
        TypeCategory::Date if parse_date(value).is_none() => {
            return Err(DbError::validation(format!(
                "Invalid date in filter '{}'. Use the {} format",
                column,
                DATE_FORMAT.replace("%Y", "YYYY").replace("%m", "MM").replace("%d", "DD")
            )));
        }
        _ if is_id_column(column) => match value.parse::<i64>() {
            Ok(id) => out.push(format!("{} = {}", column, ph), QueryParam::Int(id)),
            Err(_) => out.push(dialect.text_match(column, &ph), substring(value)),
        },
        _ if def.is_numeric() && value.parse::<f64>().is_err() => {
            return Err(DbError::validation(format!(
                "Invalid number in filter '{}'",
                column
            )));
        }
        _ if is_enum_token(value) => out.push(
            dialect.text_equals(column, &ph),
            QueryParam::String(value.to_string()),
        ),
        _ => out.push(dialect.text_match(column, &ph), substring(value)),
    }
    Ok(())
}

/// OR of substring matches over every textual column of the table.
pub fn search_predicates(
    dialect: DatabaseType,
    descriptor: &TableDescriptor,
    text: &str,
) -> DbResult<Predicates> {
    let text = text.trim();
    let mut predicates = Predicates::default();
    for column in descriptor.text_columns() {
        let column = validate_identifier(column)?;
        let ph = predicates.next_placeholder(dialect);
        predicates.push(dialect.text_match(column, &ph), substring(text));
    }
    if predicates.is_empty() {
        return Err(DbError::validation(format!(
            "Table {} has no text columns to search",
            descriptor.table_name
        )));
    }
    Ok(predicates)
}

/// At most one active sort column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortState {
    column: Option<String>,
    direction: SortDirection,
}

impl SortState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort by `column`: the same column flips direction, a new one starts ascending.
    pub fn toggle(&mut self, column: &str) {
        match &self.column {
            Some(current) if current.eq_ignore_ascii_case(column) => {
                self.direction = self.direction.reversed();
            }
            _ => {
                self.column = Some(column.to_string());
                self.direction = SortDirection::Ascending;
            }
        }
    }

    /// Set column and direction explicitly.
    pub fn set(&mut self, column: &str, direction: SortDirection) {
        self.column = Some(column.to_string());
        self.direction = direction;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// ` ORDER BY col DIR`, or nothing when unsorted.
    pub fn order_by(&self) -> DbResult<Option<String>> {
        match &self.column {
            Some(col) => Ok(Some(format!(
                "ORDER BY {} {}",
                validate_identifier(col)?,
                self.direction.as_sql()
            ))),
            None => Ok(None),
        }
    }
}

/// `SELECT * FROM table [WHERE ...] [ORDER BY ...]`.
pub fn select_statement(
    table: &str,
    predicates: &Predicates,
    joiner: &str,
    sort: Option<&SortState>,
) -> DbResult<Statement> {
    let mut parts = vec![format!("SELECT * FROM {}", validate_identifier(table)?)];
    if !predicates.is_empty() {
        parts.push(format!(
            "WHERE {}",
            predicates.conditions.join(&format!(" {} ", joiner))
        ));
    }
    if let Some(order_by) = sort.map(SortState::order_by).transpose()?.flatten() {
        parts.push(order_by);
    }
    Ok(Statement::with_params(parts.join(" "), predicates.params.clone()))
}
