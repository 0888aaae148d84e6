use anyhow::Result;
use clap::{Parser, Subcommand};
use epoch_store::{ArtifactDirs, GuardOutcome, RestStore, StdinConfirm};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "epoch-dbtool")]
#[command(about = "Session log store migration tool", long_about = None)]
struct Cli {
    /// Base URL of the session log store.
    #[arg(long, env = "EPOCH_STORE_URL")]
    store_url: String,
    /// Directory holding the backup/ and migrated/ artifact folders.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate the legacy layout to the canonical compact layout.
    Migrate {
        /// Reuse an existing backup artifact instead of taking a fresh one.
        #[arg(long)]
        backup: Option<PathBuf>,
    },
    /// Remove legacy paths once canonical data is verified present.
    Cleanup,
    /// Push a previously saved snapshot artifact back to the store.
    Restore {
        #[arg(long)]
        backup: PathBuf,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let cli = Cli::parse();
    let store = RestStore::new(cli.store_url.as_str());
    let artifacts = ArtifactDirs::new(&cli.data_dir);
    let mut confirm = StdinConfirm;

    let outcome = match cli.command {
        Commands::Migrate { backup } => {
            commands::migrate(&store, &artifacts, &mut confirm, backup.as_deref())?
        }
        Commands::Cleanup => commands::cleanup(&store, &artifacts, &mut confirm)?,
        Commands::Restore { backup } => {
            commands::restore(&store, &artifacts, &mut confirm, &backup)?
        }
    };

    match outcome {
        GuardOutcome::Applied => println!("Store updated."),
        GuardOutcome::Declined => println!("Store NOT updated."),
        GuardOutcome::AlreadyClean => println!("Nothing to do."),
    }
    Ok(())
}
