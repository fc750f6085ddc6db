//! Interactive console.
//!
//! A line-oriented stand-in for the kennel window: table list, record grid,
//! filter dialog, search, add/delete and the three reports. Input and output
//! are generic so scripted sessions can drive it in tests.

pub mod format;

use crate::browser::{AddForm, RecordBrowser, TableView};
use crate::db::Session;
use crate::error::{DbError, DbResult};
use crate::export::export_csv;
use crate::filter::FilterSet;
use crate::forms::{FieldKind, FormField, FormValues};
use crate::models::{KENNEL_TABLES, SortDirection, cell_text};
use crate::reports::{Report, ReportKind, run_report};
use format::format_grid;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tracing::{debug, error};

const PROMPT: &str = "kennel> ";

const HELP: &str = "\
Commands:
  tables                          list tables
  open <table>                    show a table (clears filters, sort and search)
  show | refresh                  re-run the current view
  sort <column> [asc|desc]        sort; repeating a column flips the direction
  filter                          edit filters column by column
  filter <col=value>...           replace all filters
  filter clear                    remove all filters
  search <text>                   search all text columns (empty text reloads)
  reset                           clear filters, sort and search
  add                             add a record to the current table
  delete <row>                    delete the row with that number
  report <breeding|elite|service> [sort-key] [asc|desc]
  export                          save the last report as CSV
  help                            this text
  quit                            leave
";

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tables,
    Open(String),
    Show,
    Sort {
        column: String,
        direction: Option<SortDirection>,
    },
    FilterDialog,
    Filter(FilterSet),
    Search(String),
    Reset,
    Add,
    Delete(usize),
    Report {
        kind: ReportKind,
        sort_key: Option<String>,
        direction: SortDirection,
    },
    Export,
    Help,
    Quit,
}

fn parse_direction(token: &str) -> Option<SortDirection> {
    match token.to_ascii_lowercase().as_str() {
        "asc" => Some(SortDirection::Ascending),
        "desc" => Some(SortDirection::Descending),
        _ => None,
    }
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> DbResult<Option<Self>> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(w, r)| (w, r.trim()))
            .unwrap_or((line, ""));
        let args: Vec<&str> = rest.split_whitespace().collect();

        let command = match word.to_ascii_lowercase().as_str() {
            "" => return Ok(None),
            "tables" => Self::Tables,
            "open" => match args.as_slice() {
                [table] => Self::Open(table.to_string()),
                _ => return Err(DbError::validation("Usage: open <table>")),
            },
            "show" | "refresh" => Self::Show,
            "sort" => match args.as_slice() {
                [column] => Self::Sort {
                    column: column.to_string(),
                    direction: None,
                },
                [column, dir] => Self::Sort {
                    column: column.to_string(),
                    direction: Some(parse_direction(dir).ok_or_else(|| {
                        DbError::validation("Sort direction must be asc or desc")
                    })?),
                },
                _ => return Err(DbError::validation("Usage: sort <column> [asc|desc]")),
            },
            "filter" => match args.as_slice() {
                [] => Self::FilterDialog,
                [clear] if clear.eq_ignore_ascii_case("clear") => Self::Filter(FilterSet::new()),
                _ => Self::Filter(FilterSet::parse_line(rest)?),
            },
            "search" => Self::Search(rest.to_string()),
            "reset" => Self::Reset,
            "add" => Self::Add,
            "delete" => match args.as_slice() {
                [row] => match row.parse::<usize>() {
                    Ok(n) if n > 0 => Self::Delete(n),
                    _ => return Err(DbError::validation("Row number must be 1 or greater")),
                },
                _ => return Err(DbError::validation("Usage: delete <row>")),
            },
            "report" => {
                let Some((name, extra)) = args.split_first() else {
                    return Err(DbError::validation(
                        "Usage: report <breeding|elite|service> [sort-key] [asc|desc]",
                    ));
                };
                let kind = ReportKind::parse(name)
                    .ok_or_else(|| DbError::validation(format!("Unknown report '{}'", name)))?;
                let mut sort_key = None;
                let mut direction = SortDirection::Descending;
                for token in extra {
                    match parse_direction(token) {
                        Some(dir) => direction = dir,
                        None => sort_key = Some(token.to_string()),
                    }
                }
                Self::Report {
                    kind,
                    sort_key,
                    direction,
                }
            }
            "export" => Self::Export,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => {
                return Err(DbError::validation(format!(
                    "Unknown command '{}'. Type 'help' for the list",
                    other
                )));
            }
        };
        Ok(Some(command))
    }
}

fn io_error(e: std::io::Error) -> DbError {
    DbError::internal(format!("Console I/O failed: {}", e))
}

pub struct Console<'s, R, W> {
    session: &'s Session,
    browser: RecordBrowser,
    last_report: Option<Report>,
    export_dir: PathBuf,
    input: Lines<R>,
    output: W,
}

impl<'s, R, W> Console<'s, R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(session: &'s Session, export_dir: impl Into<PathBuf>, input: R, output: W) -> Self {
        Self {
            session,
            browser: RecordBrowser::new(),
            last_report: None,
            export_dir: export_dir.into(),
            input: input.lines(),
            output,
        }
    }

    pub fn browser(&self) -> &RecordBrowser {
        &self.browser
    }

    /// Read-eval loop until `quit` or end of input.
    ///
    /// Command failures are printed and the loop continues; only a lost
    /// connection ends it with an error.
    pub async fn run(&mut self) -> DbResult<()> {
        let info = self.session.info();
        let greeting = format!(
            "Connected to {}{}. Type 'help' for commands.\n",
            info.database_type.display_name(),
            info.server_version
                .as_deref()
                .map(|v| format!(" {}", v))
                .unwrap_or_default()
        );
        self.write(&greeting).await?;

        loop {
            self.write(PROMPT).await?;
            let Some(line) = self.read_line().await? else {
                break;
            };
            let command = match Command::parse(&line) {
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    self.report_error(&e).await?;
                    continue;
                }
            };
            if let Err(e) = self.execute(command).await {
                if e.is_fatal() {
                    return Err(e);
                }
                self.report_error(&e).await?;
            }
        }
        Ok(())
    }

    /// Run one command.
    pub async fn execute(&mut self, command: Command) -> DbResult<()> {
        debug!(command = ?command, "Console command");
        let session = self.session;
        match command {
            Command::Tables => {
                let list: String = KENNEL_TABLES
                    .iter()
                    .enumerate()
                    .map(|(i, t)| format!("{:>2}. {}\n", i + 1, t))
                    .collect();
                self.write(&list).await
            }
            Command::Open(table) => {
                let view = self.browser.open(session, &table).await?.clone();
                self.render(&view).await
            }
            Command::Show => {
                let view = self.browser.load(session).await?.clone();
                self.render(&view).await
            }
            Command::Sort { column, direction } => {
                let view = match direction {
                    Some(dir) => self.browser.sort_with(session, &column, dir).await?,
                    None => self.browser.sort_by(session, &column).await?,
                }
                .clone();
                self.render(&view).await
            }
            Command::FilterDialog => {
                let filters = self.filter_dialog().await?;
                let view = self.browser.apply_filters(session, filters).await?.clone();
                self.render(&view).await
            }
            Command::Filter(filters) => {
                let view = self.browser.apply_filters(session, filters).await?.clone();
                self.render(&view).await
            }
            Command::Search(text) => {
                let view = self.browser.search(session, &text).await?.clone();
                self.render(&view).await
            }
            Command::Reset => {
                let view = self.browser.reset(session).await?.clone();
                self.render(&view).await
            }
            Command::Add => self.add_record().await,
            Command::Delete(row) => self.delete_record(row).await,
            Command::Report {
                kind,
                sort_key,
                direction,
            } => {
                let report = run_report(session, kind, sort_key.as_deref(), direction).await?;
                self.render_report(&report).await?;
                self.last_report = Some(report);
                Ok(())
            }
            Command::Export => {
                let report = self
                    .last_report
                    .as_ref()
                    .ok_or_else(|| DbError::validation("Run a report before exporting"))?;
                let path = export_csv(&self.export_dir, report.title, &report.result)?;
                self.write(&format!("Exported to {}\n", path.display())).await
            }
            Command::Help => self.write(HELP).await,
            Command::Quit => Ok(()),
        }
    }

    /// One-shot table view: open, filter, sort and optionally search, then
    /// render once.
    pub async fn show_table(
        &mut self,
        table: &str,
        filters: FilterSet,
        sort: Option<(&str, SortDirection)>,
        search: Option<&str>,
    ) -> DbResult<()> {
        let session = self.session;
        self.browser.open(session, table).await?;
        if !filters.is_empty() {
            self.browser.apply_filters(session, filters).await?;
        }
        if let Some((column, direction)) = sort {
            self.browser.sort_with(session, column, direction).await?;
        }
        let view = match search {
            Some(text) => self.browser.search(session, text).await?,
            None => self.browser.load(session).await?,
        }
        .clone();
        self.render(&view).await
    }

    async fn write(&mut self, text: &str) -> DbResult<()> {
        self.output
            .write_all(text.as_bytes())
            .await
            .map_err(io_error)?;
        self.output.flush().await.map_err(io_error)
    }

    async fn read_line(&mut self) -> DbResult<Option<String>> {
        self.input.next_line().await.map_err(io_error)
    }

    async fn ask(&mut self, question: &str) -> DbResult<Option<String>> {
        self.write(question).await?;
        Ok(self.read_line().await?.map(|l| l.trim().to_string()))
    }

    async fn report_error(&mut self, e: &DbError) -> DbResult<()> {
        let mut text = if e.is_validation() {
            format!("Warning: {}\n", e.user_message())
        } else {
            error!(error = %e, "Command failed");
            format!("Error: {}\n", e.user_message())
        };
        if let Some(hint) = e.suggestion() {
            text.push_str(&format!("Hint: {}\n", hint));
        }
        self.write(&text).await
    }

    async fn render(&mut self, view: &TableView) -> DbResult<()> {
        let mut text = format_grid(&view.result, true);
        if let Some(search) = &view.search {
            text.push_str(&format!("Search: '{}'\n", search));
        }
        let filters = self.browser.filters();
        if !filters.is_empty() {
            let active: Vec<String> = filters.iter().map(|(c, v)| format!("{}={}", c, v)).collect();
            text.push_str(&format!("Filters: {}\n", active.join(", ")));
        }
        if let Some(column) = self.browser.sort().column() {
            text.push_str(&format!(
                "Sorted by {} {}\n",
                column,
                self.browser.sort().direction().as_sql()
            ));
        }
        text.push_str(&view.status());
        text.push('\n');
        self.write(&text).await
    }

    async fn render_report(&mut self, report: &Report) -> DbResult<()> {
        let text = format!(
            "{}\n{}\n{}\n{}Sorted: {} {}\n",
            report.title,
            report.description,
            report.header(),
            format_grid(&report.result, false),
            report.sort_key.label,
            report.direction.as_sql()
        );
        self.write(&text).await
    }

    /// Ask for every column. Enter keeps the current value, `-` clears it.
    async fn filter_dialog(&mut self) -> DbResult<FilterSet> {
        let fields = self.browser.filter_fields(self.session).await?;
        self.write("Filter values (Enter keeps, '-' clears):\n").await?;
        let mut filters = FilterSet::new();
        for field in fields {
            let hint = if field.choices.is_empty() {
                String::new()
            } else {
                format!(" [{}]", field.choices[1..].join("/"))
            };
            let question = format!("  {}{} ({}): ", field.column, hint, field.current);
            let Some(answer) = self.ask(&question).await? else {
                return Err(DbError::validation("Filter input cancelled"));
            };
            let value = match answer.as_str() {
                "" => field.current.clone(),
                "-" => String::new(),
                _ => answer,
            };
            filters.insert(field.column, value);
        }
        Ok(filters)
    }

    async fn prompt_field(&mut self, label: &str, field: &FormField) -> DbResult<String> {
        let choices = field.choices();
        if matches!(field.kind, FieldKind::ForeignKey(_)) {
            let listing: String = choices
                .iter()
                .filter(|c| !c.is_empty())
                .map(|c| format!("    {}\n", c))
                .collect();
            self.write(&listing).await?;
        }

        let mut question = format!("  {}{}", label, if field.required { " *" } else { "" });
        match field.kind {
            FieldKind::Boolean | FieldKind::Choice(_) => {
                question.push_str(&format!(" [{}]", choices.join("/")));
            }
            FieldKind::Date => question.push_str(" (YYYY-MM-DD)"),
            _ => {}
        }
        let default = field.default_value();
        if !default.is_empty() {
            question.push_str(&format!(" <{}>", default));
        }
        question.push_str(": ");

        match self.ask(&question).await? {
            Some(answer) if answer.is_empty() => Ok(default),
            Some(answer) => Ok(answer),
            None => Err(DbError::validation("Input cancelled")),
        }
    }

    async fn prompt_fields<'f>(
        &mut self,
        fields: impl IntoIterator<Item = (&'f str, &'f FormField)>,
    ) -> DbResult<FormValues> {
        let mut values = FormValues::new();
        for (label, field) in fields {
            let value = self.prompt_field(label, field).await?;
            values.insert(field.name().to_string(), value);
        }
        Ok(values)
    }

    async fn add_record(&mut self) -> DbResult<()> {
        let session = self.session;
        match self.browser.add_form(session).await? {
            AddForm::Table(form) => {
                self.write(&format!("New record in {} (* = required):\n", form.table))
                    .await?;
                let values = self
                    .prompt_fields(form.fields.iter().map(|f| (f.name(), f)))
                    .await?;
                form.save(session, &values).await?;
                self.write("Record added\n").await?;
            }
            AddForm::Dog(form) => {
                self.write("New dog (* = required):\n").await?;
                let dog = self
                    .prompt_fields(form.dog.fields.iter().map(|f| (f.name(), f)))
                    .await?;
                self.write("First exhibition (leave empty to skip):\n").await?;
                let exhibition = self
                    .prompt_fields(form.exhibition.iter().map(|(label, f)| (*label, f)))
                    .await?;
                let saved = form.save(session, &dog, &exhibition).await?;
                let note = if saved.exhibition_saved {
                    " with exhibition record"
                } else {
                    ""
                };
                self.write(&format!("Dog {} added{}\n", saved.dog_id, note))
                    .await?;
            }
        }
        let view = self.browser.load(session).await?.clone();
        self.render(&view).await
    }

    async fn delete_record(&mut self, row: usize) -> DbResult<()> {
        let session = self.session;
        let index = row
            .checked_sub(1)
            .ok_or_else(|| DbError::validation("Row number must be 1 or greater"))?;
        let view = self
            .browser
            .view()
            .ok_or_else(|| DbError::validation("No table selected"))?;
        let first = view
            .result
            .rows
            .get(index)
            .and_then(|r| r.first())
            .map(cell_text)
            .ok_or_else(|| DbError::validation(format!("No row {} in the grid", row)))?;
        let column = view.result.columns.first().cloned().unwrap_or_default();

        let question = format!("Delete row {} ({} = {})? [y/N] ", row, column, first);
        let confirmed = self
            .ask(&question)
            .await?
            .is_some_and(|a| a.eq_ignore_ascii_case("y") || a.eq_ignore_ascii_case("yes"));
        if !confirmed {
            return self.write("Cancelled\n").await;
        }

        self.browser.delete(session, index).await?;
        self.write("Record deleted\n").await?;
        let view = self.browser.load(session).await?.clone();
        self.render(&view).await
    }
}
