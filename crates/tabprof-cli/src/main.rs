//! tabprof command line
//!
//! Usage:
//!     tabprof rules
//!     tabprof tables --connection crm
//!     tabprof run --connection crm --table contacts --table orders
//!     tabprof results --connection crm
//!     tabprof delete <result-id>

mod commands;

use clap::{Parser, Subcommand};
use tabprof_core::ProfilerConfig;

#[derive(Parser, Debug)]
#[command(name = "tabprof", about = "Profile tables in SQLite databases", version)]
struct Args {
    /// Path to tabprof.toml (falls back to TABPROF_CONFIG, then ~/.tabprof/tabprof.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the registered analysis rules
    Rules,
    /// List the tables of a configured connection
    Tables {
        #[arg(long)]
        connection: String,
    },
    /// Profile tables and print each finished task as JSON
    Run {
        #[arg(long)]
        connection: String,
        /// Table to profile; repeat for several. Defaults to every table.
        #[arg(long = "table")]
        tables: Vec<String>,
    },
    /// Print persisted results for a connection, newest first
    Results {
        #[arg(long)]
        connection: String,
    },
    /// Delete a persisted result
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabprof=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // load config: --config > TABPROF_CONFIG env > ~/.tabprof/tabprof.toml
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("TABPROF_CONFIG").ok());
    let config = ProfilerConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        ProfilerConfig::default()
    });

    match args.command {
        Command::Rules => commands::rules(),
        Command::Tables { connection } => commands::tables(&config, &connection).await,
        Command::Run { connection, tables } => commands::run(&config, &connection, tables).await,
        Command::Results { connection } => commands::results(&config, &connection),
        Command::Delete { id } => commands::delete(&config, &id),
    }
}
