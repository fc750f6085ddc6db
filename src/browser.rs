//! Record browser.
//!
//! Holds the per-window state of the table view: the open table, the
//! persistent filter set and sort state, and the last rendered result. Every
//! operation re-reads the table descriptor, so filter validation and sort
//! column checks always see the live schema.

use crate::db::{SchemaInspector, Session, TypeCategory};
use crate::error::{DbError, DbResult};
use crate::filter::{
    FilterSet, GENDER_TOKENS, MEDAL_TOKENS, SortState, build_predicates,
    search_predicates, select_statement,
};
use crate::forms::{DOGS_TABLE, DogExhibitionForm, Form, generate_form};
use crate::models::{
    ExecuteResult, QueryParam, ResultSet, SortDirection, Statement, TableDescriptor,
    kennel_table, validate_identifier,
};
use tracing::{info, warn};

/// What the grid currently shows.
#[derive(Debug, Clone)]
pub struct TableView {
    pub table: &'static str,
    pub result: ResultSet,
    /// Set when the view is a one-shot search result.
    pub search: Option<String>,
}

impl TableView {
    /// Status line under the grid.
    pub fn status(&self) -> String {
        format!("Table: {}. Records: {}", self.table, self.result.row_count())
    }
}

/// One row of the filter dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterField {
    pub column: String,
    /// Offered values; empty for free input.
    pub choices: Vec<&'static str>,
    pub current: String,
}

/// Insert form for the open table.
#[derive(Debug, Clone)]
pub enum AddForm {
    /// The Dogs table gets the combined dog + exhibition form.
    Dog(Box<DogExhibitionForm>),
    Table(Form),
}

#[derive(Debug, Default)]
pub struct RecordBrowser {
    table: Option<&'static str>,
    filters: FilterSet,
    sort: SortState,
    view: Option<TableView>,
}

impl RecordBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self) -> Option<&'static str> {
        self.table
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn sort(&self) -> &SortState {
        &self.sort
    }

    pub fn view(&self) -> Option<&TableView> {
        self.view.as_ref()
    }

    fn current_table(&self) -> DbResult<&'static str> {
        self.table
            .ok_or_else(|| DbError::validation("No table selected"))
    }

    fn current_view(&self) -> DbResult<&TableView> {
        self.view
            .as_ref()
            .ok_or_else(|| DbError::validation("No table selected"))
    }

    async fn describe(&self, session: &Session) -> DbResult<TableDescriptor> {
        SchemaInspector::describe_table(session.pool(), self.current_table()?).await
    }

    /// Switch to `name`. Filters, sort and search are cleared.
    pub async fn open(&mut self, session: &Session, name: &str) -> DbResult<&TableView> {
        let table = kennel_table(name)
            .ok_or_else(|| DbError::validation(format!("Unknown table '{}'", name)))?;
        self.table = Some(table);
        self.filters.clear();
        self.sort.clear();
        self.view = None;
        self.load(session).await
    }

    /// Re-query the open table with the current filters and sort.
    pub async fn load(&mut self, session: &Session) -> DbResult<&TableView> {
        let table = self.current_table()?;
        let descriptor = self.describe(session).await?;
        let predicates = build_predicates(session.db_type(), &self.filters, Some(&descriptor))?;
        let statement = select_statement(table, &predicates, "AND", Some(&self.sort))?;
        self.show(session, table, &statement, None).await
    }

    async fn show(
        &mut self,
        session: &Session,
        table: &'static str,
        statement: &Statement,
        search: Option<String>,
    ) -> DbResult<&TableView> {
        let result = session.fetch(statement).await?;
        info!(
            table = table,
            filters = self.filters.len(),
            sort = ?self.sort.column(),
            search = ?search,
            rows = result.row_count(),
            "Table loaded"
        );
        Ok(self.view.insert(TableView {
            table,
            result,
            search,
        }))
    }

    /// Header click: same column flips direction, another column sorts ascending.
    pub async fn sort_by(&mut self, session: &Session, column: &str) -> DbResult<&TableView> {
        let column = self.checked_column(session, column).await?;
        self.sort.toggle(&column);
        self.load(session).await
    }

    /// Sort by `column` in an explicit direction.
    pub async fn sort_with(
        &mut self,
        session: &Session,
        column: &str,
        direction: SortDirection,
    ) -> DbResult<&TableView> {
        let column = self.checked_column(session, column).await?;
        self.sort.set(&column, direction);
        self.load(session).await
    }

    async fn checked_column(&self, session: &Session, column: &str) -> DbResult<String> {
        let descriptor = self.describe(session).await?;
        let def = descriptor.column(column).ok_or_else(|| {
            DbError::validation(format!(
                "Table {} has no column '{}'",
                descriptor.table_name, column
            ))
        })?;
        Ok(validate_identifier(&def.name)?.to_string())
    }

    /// Filter dialog rows for the open table, with current values.
    pub async fn filter_fields(&self, session: &Session) -> DbResult<Vec<FilterField>> {
        let descriptor = self.describe(session).await?;
        Ok(descriptor
            .columns
            .iter()
            .map(|col| {
                let choices = match col.category() {
                    TypeCategory::Boolean => vec!["", "TRUE", "FALSE"],
                    _ if col.name.eq_ignore_ascii_case("gender") => {
                        std::iter::once("").chain(GENDER_TOKENS.iter().copied()).collect()
                    }
                    _ if col.name.eq_ignore_ascii_case("medal") => {
                        std::iter::once("").chain(MEDAL_TOKENS.iter().copied()).collect()
                    }
                    _ => Vec::new(),
                };
                FilterField {
                    column: col.name.clone(),
                    choices,
                    current: self.filters.get(&col.name).unwrap_or("").to_string(),
                }
            })
            .collect())
    }

    /// Replace the filter set. Values are validated against the column types
    /// first; on error nothing changes.
    pub async fn apply_filters(
        &mut self,
        session: &Session,
        filters: FilterSet,
    ) -> DbResult<&TableView> {
        let descriptor = self.describe(session).await?;
        build_predicates(session.db_type(), &filters, Some(&descriptor))?;
        self.filters = filters;
        self.load(session).await
    }

    /// Substring search over all text columns. Empty text reloads the table.
    pub async fn search(&mut self, session: &Session, text: &str) -> DbResult<&TableView> {
        let text = text.trim();
        if text.is_empty() {
            return self.load(session).await;
        }
        let table = self.current_table()?;
        let descriptor = self.describe(session).await?;
        let predicates = search_predicates(session.db_type(), &descriptor, text)?;
        let statement = select_statement(table, &predicates, "OR", Some(&self.sort))?;
        self.show(session, table, &statement, Some(text.to_string()))
            .await
    }

    /// Clear filters, sort and search, then reload.
    pub async fn reset(&mut self, session: &Session) -> DbResult<&TableView> {
        self.filters.clear();
        self.sort.clear();
        self.load(session).await
    }

    /// Insert form for the open table, lookups loaded.
    pub async fn add_form(&self, session: &Session) -> DbResult<AddForm> {
        let table = self.current_table()?;
        if table == DOGS_TABLE {
            Ok(AddForm::Dog(Box::new(
                DogExhibitionForm::generate(session).await?,
            )))
        } else {
            Ok(AddForm::Table(generate_form(session, table).await?))
        }
    }

    /// Delete the displayed row at `index` (zero-based).
    ///
    /// The row's first cell is taken as the key value and matched against the
    /// primary key column reported by the catalog.
    pub async fn delete(&self, session: &Session, index: usize) -> DbResult<ExecuteResult> {
        let view = self.current_view()?;
        let table = view.table;
        let row = view
            .result
            .rows
            .get(index)
            .ok_or_else(|| DbError::validation("No record selected"))?;
        let key = row
            .first()
            .map(QueryParam::from_cell)
            .ok_or_else(|| DbError::validation("Selected record has no values"))?;

        let pk = SchemaInspector::primary_key_column(session.pool(), table).await?;
        let pk = validate_identifier(&pk)?.to_string();
        if let Some(first) = view.result.columns.first() {
            if !first.eq_ignore_ascii_case(&pk) {
                warn!(
                    table = table,
                    first_column = %first,
                    primary_key = %pk,
                    "First displayed column is not the primary key"
                );
            }
        }

        let statement = delete_statement(session, table, &pk, key).await?;
        let result = session.execute(&statement).await?;
        if result.rows_affected == 0 {
            return Err(DbError::not_found(format!(
                "No record in {} with {} = {}",
                table, pk, statement.params[0]
            )));
        }
        info!(table = table, key = %statement.params[0], "Record deleted");
        Ok(result)
    }
}

async fn delete_statement(
    session: &Session,
    table: &str,
    pk: &str,
    key: QueryParam,
) -> DbResult<Statement> {
    let dialect = session.db_type();
    let cast = match key {
        QueryParam::String(_) => {
            let descriptor = SchemaInspector::describe_table(session.pool(), table).await?;
            descriptor
                .column(pk)
                .and_then(|c| c.cast_target())
                .map(String::from)
        }
        _ => None,
    };
    Ok(Statement::with_params(
        format!(
            "DELETE FROM {} WHERE {} = {}",
            table,
            pk,
            dialect.cast_placeholder(1, cast.as_deref())
        ),
        vec![key],
    ))
}

