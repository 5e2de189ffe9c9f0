//! classpulse CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "classpulse", version, about = "Teacher dashboard analytics and risk scoring")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the dashboard roster for a teacher
    Roster {
        /// Teacher id to build the view for
        #[arg(long)]
        teacher_id: String,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,

        /// Also write the full view JSON to this path
        #[arg(long)]
        output: Option<PathBuf>,

        /// Max concurrent per-student aggregations
        #[arg(long)]
        parallelism: Option<usize>,

        /// Cache TTL in seconds
        #[arg(long)]
        cache_ttl_secs: Option<u64>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Check connectivity to the document store and prediction service
    Health {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("classpulse=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Roster {
            teacher_id,
            format,
            output,
            parallelism,
            cache_ttl_secs,
            config,
        } => {
            commands::roster::execute(teacher_id, format, output, parallelism, cache_ttl_secs, config)
                .await
        }
        Commands::Health { config } => commands::health::execute(config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
