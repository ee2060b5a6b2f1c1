use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use taskd::http::{self, AppContext};
use taskd::{
    Config, Database, Profile,
    cli::{Cli, Commands},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev { Profile::Dev } else { Profile::Prod };

    // Load configuration with the determined profile
    let mut config = Config::load_with_profile(profile)?;

    // Apply CLI overrides (serve is the default command)
    if let Some(Commands::Serve { host, port, db }) = cli.command {
        if let Some(host) = host {
            config.host = host;
        }
        if let Some(port) = port {
            config.port = port;
        }
        if let Some(db) = db {
            config.database_path = db;
        }
    }

    // Initialize database schema once at startup; requests open their own
    // connections afterwards
    let db_path = config.get_database_path();
    let db = Database::open(&db_path)?;
    db.initialize_schema()?;
    drop(db);
    info!("database ready at {}", db_path.display());

    let ctx = Arc::new(AppContext::new(db_path));
    http::serve(ctx, &config.host, config.port).await?;

    Ok(())
}
