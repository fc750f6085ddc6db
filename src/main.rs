//! Kennel database client - main entry point.
//!
//! Connects once at startup, then either runs a one-shot subcommand or the
//! interactive console. A failed connection ends the process.

use clap::Parser;
use kennel_db::config::{Command, Config};
use kennel_db::console::{Command as ConsoleCommand, Console};
use kennel_db::db::Session;
use kennel_db::error::DbResult;
use kennel_db::filter::FilterSet;
use kennel_db::models::SortDirection;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber. Logs go to stderr; stdout carries the
/// console.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run_command<R, W>(console: &mut Console<'_, R, W>, command: Command) -> DbResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match command {
        Command::Tables => console.execute(ConsoleCommand::Tables).await,
        Command::Show {
            table,
            filters,
            sort,
            desc,
            search,
        } => {
            let filters = filters
                .into_iter()
                .fold(FilterSet::new(), |set, (column, value)| set.with(column, value));
            let direction = if desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            console
                .show_table(
                    &table,
                    filters,
                    sort.as_deref().map(|column| (column, direction)),
                    search.as_deref(),
                )
                .await
        }
        Command::Report {
            kind,
            sort,
            asc,
            desc: _,
            export,
        } => {
            let direction = if asc {
                SortDirection::Ascending
            } else {
                SortDirection::Descending
            };
            console
                .execute(ConsoleCommand::Report {
                    kind,
                    sort_key: sort,
                    direction,
                })
                .await?;
            if export {
                console.execute(ConsoleCommand::Export).await?;
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    info!("Starting kennel client v{}", env!("CARGO_PKG_VERSION"));

    let connection = match config.connection_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let session = match Session::connect(&connection).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "Cannot connect to database");
            eprintln!("Error: {}", e.user_message());
            if let Some(hint) = e.suggestion() {
                eprintln!("Hint: {}", hint);
            }
            std::process::exit(1);
        }
    };

    let stdout = tokio::io::stdout();
    let result = match config.command.clone() {
        Some(command) => {
            let mut console = Console::new(&session, &config.export_dir, tokio::io::empty(), stdout);
            run_command(&mut console, command).await
        }
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            let mut console = Console::new(&session, &config.export_dir, stdin, stdout);
            console.run().await
        }
    };

    session.close().await;

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e.user_message());
        std::process::exit(1);
    }

    info!("Shutdown complete");
    Ok(())
}
