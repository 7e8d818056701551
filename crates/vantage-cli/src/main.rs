//! Vantage CLI - operator commands for a record index

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "vantage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the index database file [default: ./vantage.db]
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// JSON store configuration; `--db` overrides its path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index cursor, schema and record counts
    Status {
        /// Work-log database to measure lag against
        #[arg(short, long)]
        worklog: Option<PathBuf>,
    },

    /// Records of an angle and collection changed since a point in time
    Lookup {
        /// Epoch milliseconds or an RFC 3339 timestamp
        #[arg(short, long, default_value = "0")]
        since: String,

        /// View angle
        #[arg(short, long)]
        angle: String,

        /// Collection pid
        #[arg(short, long)]
        collection: String,

        /// State filter: A, I or D
        #[arg(long)]
        state: Option<String>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, default_value_t = 100)]
        limit: usize,

        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },

    /// Newest change time of an angle and collection
    Latest {
        /// View angle
        #[arg(short, long)]
        angle: String,

        /// Collection pid
        #[arg(short, long)]
        collection: String,

        /// State filter: A, I or D
        #[arg(long)]
        state: Option<String>,
    },

    /// Dead letter queue commands
    #[command(subcommand)]
    Dlq(DlqCommands),
}

#[derive(Subcommand)]
enum DlqCommands {
    /// List skipped work-log units
    List {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Remove one entry
    Remove { id: i64 },

    /// Remove every entry
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let store = commands::store_config(cli.db, cli.config.as_deref())?;

    match cli.command {
        Commands::Status { worklog } => {
            commands::status::execute(store, worklog)?;
        }
        Commands::Lookup {
            since,
            angle,
            collection,
            state,
            offset,
            limit,
            json,
        } => {
            let args = commands::lookup::LookupArgs {
                since,
                angle,
                collection,
                state,
                offset,
                limit,
                json,
            };
            commands::lookup::execute(store, args)?;
        }
        Commands::Latest {
            angle,
            collection,
            state,
        } => {
            commands::latest::execute(store, &angle, &collection, state.as_deref())?;
        }
        Commands::Dlq(cmd) => match cmd {
            DlqCommands::List { limit } => commands::dlq::list(store, limit)?,
            DlqCommands::Remove { id } => commands::dlq::remove(store, id)?,
            DlqCommands::Clear { force } => commands::dlq::clear(store, force)?,
        },
    }

    Ok(())
}
