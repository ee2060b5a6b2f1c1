use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "taskd")]
#[command(about = "Task tracking HTTP service backed by SQLite")]
#[command(version)]
pub struct Cli {
    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server (default if no subcommand)
    Serve {
        /// Bind address, overriding the configured host
        #[arg(long)]
        host: Option<String>,

        /// Port, overriding the configured port
        #[arg(long)]
        port: Option<u16>,

        /// Database file path, overriding the configured path
        #[arg(long)]
        db: Option<String>,
    },
}
