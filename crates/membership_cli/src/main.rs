//! Operator CLI for membership core.
//!
//! # Responsibility
//! - Verify `membership_core` linkage (`version`).
//! - Report personal data backup backlog for a configured database (`status`).

use clap::{Parser, Subcommand};
use membership_core::{
    core_version, ApplicationRepository, CoreConfig, SqliteApplicationRepository,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "membership", version)]
#[command(about = "Membership applications maintenance tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the core crate version
    Version,
    /// Print application and pending backup counts
    Status {
        /// JSON config file (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Version => {
            println!("membership_core version={}", core_version());
            Ok(())
        }
        Commands::Status { config } => run_status(config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run_status(config_path: Option<PathBuf>) -> Result<(), String> {
    let config = match config_path {
        Some(path) => CoreConfig::load(path).map_err(|err| err.to_string())?,
        None => CoreConfig::default(),
    };
    config.init_logging()?;

    let conn = config.open_database().map_err(|err| err.to_string())?;
    let repo = SqliteApplicationRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let total = repo.count_applications().map_err(|err| err.to_string())?;
    let pending = repo
        .count_pending_backup()
        .map_err(|err| err.to_string())?;

    log::info!("event=cli_status module=cli status=ok total={total} pending_backup={pending}");
    println!("applications={total} pending_backup={pending}");
    Ok(())
}
