//! oxide-dbal CLI
//!
//! Checks schema documents and synchronizes a database with them.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use oxide_dbal::{Connection, ConnectionConfig, Synchronizer};
use oxide_dbal_core::error::{render_table_errors, ParserError};
use oxide_dbal_core::schema::{load_files, Schema};
use oxide_dbal_core::sync::SyncActions;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Declarative schema checks and sync.
#[derive(Parser)]
#[command(name = "oxide-dbal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL.
    #[arg(short, long, env = "DATABASE_URL", global = true)]
    database: Option<String>,

    /// Prefix applied to every table name.
    #[arg(short, long, default_value = "", global = true)]
    prefix: String,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse schema documents and report inconsistencies.
    Check {
        /// Schema documents, merged in order.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Bring the database in line with schema documents.
    Sync {
        /// Schema documents, merged in order.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Execute the statements (default is a dry run).
        #[arg(long)]
        act: bool,

        /// Also drop columns, indexes and foreign keys that are not declared.
        #[arg(long)]
        remove: bool,

        /// Leave views alone.
        #[arg(long)]
        no_views: bool,

        /// Print the report as JSON instead of the plain log.
        #[arg(long)]
        json: bool,

        /// Advisory lock serializing concurrent runs.
        #[arg(long, default_value = "oxide-dbal-sync")]
        lock: String,

        /// Seconds to wait for the lock.
        #[arg(long, default_value_t = 30)]
        lock_timeout: u64,
    },
}

/// Loads and merges documents, printing structural errors.
fn load(files: &[PathBuf]) -> anyhow::Result<Option<Schema>> {
    match load_files(files) {
        Ok(schema) => Ok(Some(schema)),
        Err(ParserError::Invalid { errors }) => {
            println!("Schema errors:\n{}", render_table_errors(&errors));
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Check { files } => {
            let Some(schema) = load(&files)? else {
                return Ok(ExitCode::FAILURE);
            };
            let problems = schema.sanity_check();
            if problems.is_empty() {
                println!(
                    "{} table(s), {} view(s): OK",
                    schema.tables.len(),
                    schema.views.len()
                );
                Ok(ExitCode::SUCCESS)
            } else {
                println!("Sanity check failed:\n{}", render_table_errors(&problems));
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Sync {
            files,
            act,
            remove,
            no_views,
            json,
            lock,
            lock_timeout,
        } => {
            let Some(schema) = load(&files)? else {
                return Ok(ExitCode::FAILURE);
            };
            for (table, problems) in schema.sanity_check() {
                for problem in problems {
                    warn!("{table}: {problem}");
                }
            }

            let url = cli
                .database
                .ok_or_else(|| anyhow::anyhow!("--database or DATABASE_URL is required"))?;
            let conn =
                Connection::connect(ConnectionConfig::new(url).table_prefix(cli.prefix)).await?;
            let actions = SyncActions {
                remove,
                views: !no_views,
                ..SyncActions::default()
            };

            if !act {
                info!("Dry run - pass --act to execute");
            }
            let report = Synchronizer::new(&conn)
                .actions(actions)
                .with_lock(&lock, Duration::from_secs(lock_timeout), &schema, act)
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.log);
            }
            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
