//! Playroom API - Main Server
//!
//! Backend-for-frontend with Auth0 token verification, Postgres row-level
//! security, and the game room / invitation lifecycle.

use anyhow::Result;
use clap::{Parser, Subcommand};
use playroom::{store, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "playroom")]
#[command(about = "Playroom API Server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Create/verify the database schema and row-security policies
    Provision,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,playroom=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            playroom::start_server(config).await
        }
        Commands::Provision => run_provision(config).await,
    }
}

async fn run_provision(config: Config) -> Result<()> {
    tracing::info!("Provisioning database schema");

    let pool = store::connect(&config.database_url, config.max_connections).await?;
    store::schema::provision(&pool).await?;

    tracing::info!("Provisioning complete");
    Ok(())
}
