use clap::{Parser, Subcommand};
use murmur_chat::{app, config::AppConfig};
use std::path::PathBuf;
use std::process::ExitCode;

/// Murmur: CQRS chat and micro-blog backend.
#[derive(Parser, Debug)]
#[command(name = "murmur-chat", version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file. Falls back to the
    /// MURMUR_CONFIG environment variable, then to built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server and the projection engine.
    Serve,
    /// Dump the raw event topic as JSON lines (cqrs.export.file).
    Export,
    /// Publish a previously exported dump back onto the topic, preserving
    /// partitions (cqrs.import.file).
    Import,
    /// Delete the consumer group and topic, recreate the topic, re-create
    /// the SQL schema, and arm the sequence fast-forward latch.
    Reset,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Serve => app::serve(config).await,
        Commands::Export => app::export(config).await,
        Commands::Import => app::import(config).await,
        Commands::Reset => app::reset(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "command failed");
            ExitCode::FAILURE
        }
    }
}
