use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "covisit-cli", version, about = "Covisit CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check-in lifecycle
    Checkin {
        #[command(subcommand)]
        action: commands::checkin::CheckinAction,
    },
    /// Check-in history
    Diary {
        #[command(subcommand)]
        action: commands::diary::DiaryAction,
    },
    /// Problematic-event sync
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// Positive-test reporting
    Report {
        #[command(subcommand)]
        action: commands::report::ReportAction,
    },
    /// Decoy traffic scheduling
    Decoy {
        #[command(subcommand)]
        action: commands::decoy::DecoyAction,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Checkin { action } => commands::checkin::run(action),
        Commands::Diary { action } => commands::diary::run(action),
        Commands::Sync { action } => commands::sync::run(action).await,
        Commands::Report { action } => commands::report::run(action).await,
        Commands::Decoy { action } => commands::decoy::run(action).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
