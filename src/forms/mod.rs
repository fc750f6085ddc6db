//! Input forms generated from table metadata.
//!
//! A form is the list of a table's writable columns, each with a field kind
//! picked by a fixed rule table over (column name, declared type). Submitted
//! raw strings are coerced per field into typed statement parameters.

pub mod dog_exhibition;

use crate::db::{SchemaInspector, Session};
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnDefinition, DatabaseType, ExecuteResult, QueryParam, Statement, TableDescriptor,
    cell_text, validate_identifier,
};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, info};

pub use dog_exhibition::{DOGS_TABLE, DogExhibitionForm, EXHIBITIONS_TABLE, SavedDog};

/// Boolean input domain.
pub const BOOL_CHOICES: &[&str] = &["TRUE", "FALSE"];
/// Gender input domain; the first entry is the default.
pub const GENDER_CHOICES: &[&str] = &["M", "F"];
/// Medal input domain; empty means no medal.
pub const MEDAL_CHOICES: &[&str] = &["", "Gold", "Silver", "Bronze"];

/// Accepted date format for date fields and date filters.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw user input keyed by column name.
pub type FormValues = HashMap<String, String>;

/// Referenced table feeding a foreign-key choice list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupSource {
    Breeds,
    Dogs,
    Illnesses,
}

impl LookupSource {
    /// Query returning `(id, display name)` pairs.
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Breeds => "SELECT id_breed, name FROM Breeds ORDER BY name",
            Self::Dogs => "SELECT id_dog, owner FROM Dogs WHERE alive = TRUE ORDER BY owner",
            Self::Illnesses => "SELECT id_illness, name FROM Medicine_book ORDER BY name",
        }
    }

    /// Dog references may be left empty.
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Dogs)
    }
}

/// Input representation of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// ISO `YYYY-MM-DD` date
    Date,
    /// TRUE / FALSE
    Boolean,
    /// Fixed list of values
    Choice(&'static [&'static str]),
    /// Id picked from a lookup query
    ForeignKey(LookupSource),
    /// Free text
    Text,
}

#[derive(Debug, Clone, Copy)]
enum Matcher {
    TypeContains(&'static str),
    ColumnIn(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
struct FieldRule {
    matcher: Matcher,
    kind: FieldKind,
}

/// Ordered rule table; the first matching rule wins.
const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        matcher: Matcher::TypeContains("date"),
        kind: FieldKind::Date,
    },
    FieldRule {
        matcher: Matcher::TypeContains("bool"),
        kind: FieldKind::Boolean,
    },
    FieldRule {
        matcher: Matcher::ColumnIn(&["gender"]),
        kind: FieldKind::Choice(GENDER_CHOICES),
    },
    FieldRule {
        matcher: Matcher::ColumnIn(&["medal"]),
        kind: FieldKind::Choice(MEDAL_CHOICES),
    },
    FieldRule {
        matcher: Matcher::ColumnIn(&["id_breed"]),
        kind: FieldKind::ForeignKey(LookupSource::Breeds),
    },
    FieldRule {
        matcher: Matcher::ColumnIn(&["id_mother", "id_father", "id_dog"]),
        kind: FieldKind::ForeignKey(LookupSource::Dogs),
    },
    FieldRule {
        matcher: Matcher::ColumnIn(&["id_illness"]),
        kind: FieldKind::ForeignKey(LookupSource::Illnesses),
    },
];

/// Pick the field kind for a column.
pub fn field_kind(column_name: &str, data_type: &str) -> FieldKind {
    let data_type = data_type.to_lowercase();
    FIELD_RULES
        .iter()
        .find(|rule| match rule.matcher {
            Matcher::TypeContains(needle) => data_type.contains(needle),
            Matcher::ColumnIn(names) => names.iter().any(|n| n.eq_ignore_ascii_case(column_name)),
        })
        .map(|rule| rule.kind)
        .unwrap_or(FieldKind::Text)
}

/// True for `TRUE` / `FALSE` in any case.
pub fn is_bool_token(value: &str) -> bool {
    value.eq_ignore_ascii_case("TRUE") || value.eq_ignore_ascii_case("FALSE")
}

/// Parse a strict `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Integer, then float, then the raw text.
pub fn parse_number(value: &str) -> QueryParam {
    if let Ok(i) = value.parse::<i64>() {
        return QueryParam::Int(i);
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() => QueryParam::Float(f),
        _ => QueryParam::String(value.to_string()),
    }
}

/// One entry of a foreign-key choice list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupChoice {
    pub id: i64,
    pub label: String,
}

impl LookupChoice {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            label: format!("{} (ID: {})", name, id),
        }
    }
}

/// A coerced value ready to be bound into an INSERT.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub column: String,
    pub param: QueryParam,
    /// Type to cast a text parameter into (PostgreSQL only)
    pub cast: Option<String>,
}

impl FieldValue {
    pub fn new(column: impl Into<String>, param: QueryParam) -> Self {
        Self {
            column: column.into(),
            param,
            cast: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormField {
    pub column: ColumnDefinition,
    pub kind: FieldKind,
    /// Loaded choices for foreign-key fields.
    pub lookup: Vec<LookupChoice>,
    pub required: bool,
}

impl FormField {
    pub fn new(column: ColumnDefinition) -> Self {
        let kind = field_kind(&column.name, &column.data_type);
        Self {
            column,
            kind,
            lookup: Vec::new(),
            required: false,
        }
    }

    pub fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn name(&self) -> &str {
        &self.column.name
    }

    /// Values offered to the user; empty for free-form fields.
    pub fn choices(&self) -> Vec<String> {
        match self.kind {
            FieldKind::Boolean => BOOL_CHOICES.iter().map(|c| c.to_string()).collect(),
            FieldKind::Choice(options) => options.iter().map(|c| c.to_string()).collect(),
            FieldKind::ForeignKey(source) => {
                let empty = source.is_optional().then(String::new);
                empty
                    .into_iter()
                    .chain(self.lookup.iter().map(|c| c.label.clone()))
                    .collect()
            }
            FieldKind::Date | FieldKind::Text => Vec::new(),
        }
    }

    /// Pre-selected value.
    pub fn default_value(&self) -> String {
        match self.kind {
            FieldKind::Boolean => "TRUE".to_string(),
            FieldKind::Choice(options) => options.first().map(|c| c.to_string()).unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// Coerce one raw value. Empty input yields `None` (column omitted).
    pub fn coerce(&self, raw: &str) -> DbResult<Option<FieldValue>> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(None);
        }

        let param = match self.kind {
            FieldKind::ForeignKey(_) => QueryParam::Int(self.resolve_lookup(value)?),
            _ if is_bool_token(value) => QueryParam::Bool(value.eq_ignore_ascii_case("TRUE")),
            FieldKind::Boolean => {
                return Err(DbError::validation(format!(
                    "Field '{}' accepts only TRUE or FALSE",
                    self.name()
                )));
            }
            FieldKind::Date => match parse_date(value) {
                Some(date) => QueryParam::Date(date),
                None => {
                    return Err(DbError::validation(format!(
                        "Invalid date in field '{}'. Use the YYYY-MM-DD format",
                        self.name()
                    )));
                }
            },
            FieldKind::Choice(options) => {
                if !options.iter().any(|o| *o == value) {
                    return Err(DbError::validation(format!(
                        "Field '{}' must be one of: {}",
                        self.name(),
                        options.join(", ")
                    )));
                }
                QueryParam::String(value.to_string())
            }
            FieldKind::Text if self.column.is_numeric() => parse_number(value),
            FieldKind::Text => QueryParam::String(value.to_string()),
        };

        Ok(Some(self.field_value(param)))
    }

    pub(crate) fn field_value(&self, param: QueryParam) -> FieldValue {
        let cast = match param {
            QueryParam::String(_) => self.column.cast_target().map(String::from),
            _ => None,
        };
        FieldValue {
            column: self.column.name.clone(),
            param,
            cast,
        }
    }

    /// Map a choice label (or a bare id from the list) back to its id.
    fn resolve_lookup(&self, value: &str) -> DbResult<i64> {
        if let Some(choice) = self.lookup.iter().find(|c| c.label == value) {
            return Ok(choice.id);
        }
        if let Ok(id) = value.parse::<i64>() {
            if self.lookup.iter().any(|c| c.id == id) {
                return Ok(id);
            }
        }
        Err(DbError::validation(format!(
            "'{}' is not a valid choice for field '{}'",
            value,
            self.name()
        )))
    }
}

/// Insert form for one table.
#[derive(Debug, Clone)]
pub struct Form {
    pub table: String,
    pub fields: Vec<FormField>,
}

impl Form {
    /// Build fields for every column the database does not fill itself.
    /// Lookups stay empty until [`load_lookups`] runs.
    pub fn from_descriptor(descriptor: &TableDescriptor) -> Self {
        let fields = descriptor
            .columns
            .iter()
            .filter(|c| !c.is_generated)
            .cloned()
            .map(FormField::new)
            .collect();
        Self {
            table: descriptor.table_name.clone(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    /// Mark the named fields as required.
    pub fn require(&mut self, names: &[&str]) {
        for field in &mut self.fields {
            if names.iter().any(|n| n.eq_ignore_ascii_case(&field.column.name)) {
                field.required = true;
            }
        }
    }

    /// Coerce submitted values in field order, skipping empty input.
    pub fn coerce(&self, values: &FormValues) -> DbResult<Vec<FieldValue>> {
        if let Some(unknown) = values.keys().find(|k| self.field(k).is_none()) {
            return Err(DbError::validation(format!(
                "Table {} has no editable field '{}'",
                self.table, unknown
            )));
        }

        let mut coerced = Vec::new();
        for field in &self.fields {
            let raw = lookup_value(values, field.name()).unwrap_or("");
            match field.coerce(raw)? {
                Some(value) => coerced.push(value),
                None if field.required => {
                    return Err(DbError::validation(format!(
                        "Field '{}' is required",
                        field.name()
                    )));
                }
                None => {}
            }
        }
        Ok(coerced)
    }

    /// Coerce and insert one row in its own transaction.
    pub async fn save(&self, session: &Session, values: &FormValues) -> DbResult<ExecuteResult> {
        let coerced = self.coerce(values)?;
        let statement = insert_statement(session.db_type(), &self.table, &coerced, None)?;
        let result = session.execute(&statement).await?;
        info!(table = %self.table, "Record added");
        Ok(result)
    }
}

fn lookup_value<'a>(values: &'a FormValues, column: &str) -> Option<&'a str> {
    values
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(column))
        .map(|(_, v)| v.as_str())
}

/// Build `INSERT INTO table (cols) VALUES (params) [RETURNING col]`.
pub fn insert_statement(
    dialect: DatabaseType,
    table: &str,
    values: &[FieldValue],
    returning: Option<&str>,
) -> DbResult<Statement> {
    validate_identifier(table)?;
    if values.is_empty() {
        return Err(DbError::validation("No values entered"));
    }

    let mut columns = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        columns.push(validate_identifier(&value.column)?);
        placeholders.push(dialect.cast_placeholder(i + 1, value.cast.as_deref()));
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    );
    if let Some(col) = returning {
        sql.push_str(" RETURNING ");
        sql.push_str(validate_identifier(col)?);
    }

    Ok(Statement::with_params(
        sql,
        values.iter().map(|v| v.param.clone()).collect(),
    ))
}

/// Read the catalog and build the insert form for `table`, lookups loaded.
pub async fn generate_form(session: &Session, table: &str) -> DbResult<Form> {
    let descriptor = SchemaInspector::describe_table(session.pool(), table).await?;
    let mut form = Form::from_descriptor(&descriptor);
    load_lookups(session, &mut form.fields).await?;
    debug!(table = %table, fields = form.fields.len(), "Form generated");
    Ok(form)
}

/// Fill the choice lists of foreign-key fields, one query per source.
pub async fn load_lookups(session: &Session, fields: &mut [FormField]) -> DbResult<()> {
    let mut loaded: HashMap<LookupSource, Vec<LookupChoice>> = HashMap::new();
    for field in fields.iter_mut() {
        let FieldKind::ForeignKey(source) = field.kind else {
            continue;
        };
        if !loaded.contains_key(&source) {
            let choices = fetch_lookup(session, source).await?;
            loaded.insert(source, choices);
        }
        field.lookup = loaded.get(&source).cloned().unwrap_or_default();
    }
    Ok(())
}

async fn fetch_lookup(session: &Session, source: LookupSource) -> DbResult<Vec<LookupChoice>> {
    let result = session.fetch(&Statement::new(source.sql())).await?;
    Ok(result
        .rows
        .iter()
        .filter_map(|row| {
            let id = row.first()?.as_i64()?;
            let name = row.get(1).map(cell_text).unwrap_or_default();
            Some(LookupChoice::new(id, &name))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_kind_rules_in_order() {
        assert_eq!(field_kind("birthday", "date"), FieldKind::Date);
        assert_eq!(field_kind("alive", "boolean"), FieldKind::Boolean);
        assert_eq!(field_kind("alive", "BOOLEAN"), FieldKind::Boolean);
        assert_eq!(field_kind("gender", "character"), FieldKind::Choice(GENDER_CHOICES));
        assert_eq!(field_kind("gender", "USER-DEFINED"), FieldKind::Choice(GENDER_CHOICES));
        assert_eq!(field_kind("medal", "character varying"), FieldKind::Choice(MEDAL_CHOICES));
        assert_eq!(
            field_kind("id_breed", "integer"),
            FieldKind::ForeignKey(LookupSource::Breeds)
        );
        assert_eq!(
            field_kind("id_mother", "integer"),
            FieldKind::ForeignKey(LookupSource::Dogs)
        );
        assert_eq!(
            field_kind("id_illness", "integer"),
            FieldKind::ForeignKey(LookupSource::Illnesses)
        );
        assert_eq!(field_kind("owner", "character varying"), FieldKind::Text);
        // Type rules win over name rules
        assert_eq!(field_kind("id_dog", "date"), FieldKind::Date);
    }

    #[test]
    fn test_defaults() {
        let alive = FormField::new(ColumnDefinition::new("alive", "boolean", false));
        assert_eq!(alive.default_value(), "TRUE");
        let gender = FormField::new(ColumnDefinition::new("gender", "character", false));
        assert_eq!(gender.default_value(), "M");
        let medal = FormField::new(ColumnDefinition::new("medal", "text", true));
        assert_eq!(medal.default_value(), "");
        let owner = FormField::new(ColumnDefinition::new("owner", "text", false));
        assert_eq!(owner.default_value(), "");
    }

    #[test]
    fn test_choices_for_optional_lookup_start_empty() {
        let mut field = FormField::new(ColumnDefinition::new("id_father", "integer", true));
        field.lookup = vec![LookupChoice::new(3, "Ivanov")];
        assert_eq!(field.choices(), vec!["".to_string(), "Ivanov (ID: 3)".to_string()]);

        let mut breed = FormField::new(ColumnDefinition::new("id_breed", "integer", false));
        breed.lookup = vec![LookupChoice::new(1, "Husky")];
        assert_eq!(breed.choices(), vec!["Husky (ID: 1)".to_string()]);
    }

    #[test]
    fn test_coerce_lookup_label_and_id() {
        let mut field = FormField::new(ColumnDefinition::new("id_breed", "integer", false));
        field.lookup = vec![LookupChoice::new(1, "Husky"), LookupChoice::new(2, "Akita")];

        let v = field.coerce("Akita (ID: 2)").unwrap().unwrap();
        assert_eq!(v.param, QueryParam::Int(2));
        let v = field.coerce("1").unwrap().unwrap();
        assert_eq!(v.param, QueryParam::Int(1));
        assert!(field.coerce("Poodle (ID: 9)").unwrap_err().is_validation());
        assert!(field.coerce("").unwrap().is_none());
    }

    #[test]
    fn test_coerce_scalars() {
        let alive = FormField::new(ColumnDefinition::new("alive", "boolean", false));
        assert_eq!(alive.coerce("false").unwrap().unwrap().param, QueryParam::Bool(false));
        assert!(alive.coerce("yes").unwrap_err().is_validation());

        let score = FormField::new(ColumnDefinition::new("assesment", "integer", false));
        assert_eq!(score.coerce("5").unwrap().unwrap().param, QueryParam::Int(5));
        assert_eq!(score.coerce("4.5").unwrap().unwrap().param, QueryParam::Float(4.5));
        assert_eq!(
            score.coerce("five").unwrap().unwrap().param,
            QueryParam::String("five".into())
        );

        let born = FormField::new(ColumnDefinition::new("birthday", "date", true));
        assert_eq!(
            born.coerce("2020-02-29").unwrap().unwrap().param,
            QueryParam::Date(NaiveDate::from_ymd_opt(2020, 2, 29).unwrap())
        );
        assert!(born.coerce("29.02.2020").unwrap_err().is_validation());

        let gender = FormField::new(ColumnDefinition::new("gender", "character", false));
        assert!(gender.coerce("X").unwrap_err().is_validation());
    }

    #[test]
    fn test_text_into_typed_column_is_cast() {
        let gender = FormField::new(
            ColumnDefinition::new("gender", "USER-DEFINED", false).with_udt_name("gender_type"),
        );
        let v = gender.coerce("F").unwrap().unwrap();
        assert_eq!(v.cast.as_deref(), Some("gender_type"));

        let owner = FormField::new(
            ColumnDefinition::new("owner", "character varying", false).with_udt_name("varchar"),
        );
        assert_eq!(owner.coerce("Ivanov").unwrap().unwrap().cast, None);
    }

    #[test]
    fn test_form_skips_generated_and_checks_required() {
        let desc = TableDescriptor::new("Dogs")
            .with_column(
                ColumnDefinition::new("id_dog", "integer", false)
                    .with_primary_key(true)
                    .with_generated(true),
            )
            .with_column(ColumnDefinition::new("owner", "text", false))
            .with_column(ColumnDefinition::new("nickname", "text", true));
        let mut form = Form::from_descriptor(&desc);
        assert!(form.field("id_dog").is_none());
        form.require(&["owner"]);

        let values = FormValues::from([("nickname".to_string(), "Rex".to_string())]);
        let err = form.coerce(&values).unwrap_err();
        assert!(err.to_string().contains("owner"));

        let values = FormValues::from([("owner".to_string(), "Ivanov".to_string())]);
        let coerced = form.coerce(&values).unwrap();
        assert_eq!(coerced, vec![FieldValue::new("owner", QueryParam::String("Ivanov".into()))]);

        let values = FormValues::from([("color".to_string(), "red".to_string())]);
        assert!(form.coerce(&values).unwrap_err().is_validation());
    }

    #[test]
    fn test_insert_statement_per_dialect() {
        let values = vec![
            FieldValue::new("owner", QueryParam::String("Ivanov".into())),
            FieldValue {
                column: "gender".into(),
                param: QueryParam::String("M".into()),
                cast: Some("gender_type".into()),
            },
        ];
        let pg = insert_statement(DatabaseType::PostgreSQL, "Dogs", &values, Some("id_dog")).unwrap();
        assert_eq!(
            pg.sql,
            "INSERT INTO Dogs (owner, gender) VALUES ($1, CAST($2 AS gender_type)) RETURNING id_dog"
        );
        assert_eq!(pg.params.len(), 2);

        let lite = insert_statement(DatabaseType::SQLite, "Dogs", &values, None).unwrap();
        assert_eq!(lite.sql, "INSERT INTO Dogs (owner, gender) VALUES (?, ?)");

        assert!(insert_statement(DatabaseType::SQLite, "Dogs", &[], None).is_err());
    }
}
