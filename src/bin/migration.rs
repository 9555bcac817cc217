use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use invoice_ml_server::{config, migrator};

/// Applies or reverts the database schema.
#[derive(Parser, Debug)]
#[command(name = "migration", version)]
struct Cli {
    /// Database URL; defaults to `DATABASE_URL`, then the configured `database_url`
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Apply pending migrations (default)
    Up,
    /// Revert every applied migration
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    let database_url = match cli.database_url.or_else(|| std::env::var("DATABASE_URL").ok()) {
        Some(url) => url,
        None => config::load_config()?.database_url,
    };

    match cli.command.unwrap_or(Command::Up) {
        Command::Up => {
            info!("Starting database migration");
            migrator::run_migration(&database_url).await?;
        }
        Command::Reset => {
            info!("Reverting database schema");
            migrator::reset_database(&database_url).await?;
        }
    }

    Ok(())
}
