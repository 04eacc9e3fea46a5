mod overrides;
mod products;
mod sync;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::overrides::OverridesCommands;
use crate::products::ProductsCommands;
use crate::sync::SyncCommands;

#[derive(Debug, Parser)]
#[command(name = "wscat-cli")]
#[command(about = "Wholesale catalog command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Trigger sync runs and inspect their history
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Inspect the price/stock override feed
    Overrides {
        #[command(subcommand)]
        command: OverridesCommands,
    },
    /// Query the catalog the way the storefront sees it
    Products {
        #[command(subcommand)]
        command: ProductsCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("wscat-cli: no command given; run with --help for usage");
        return Ok(());
    };

    let config = wscat_core::load_app_config()?;
    init_tracing(&config.log_level);
    tracing::debug!(env = %config.env, "configuration loaded");

    match command {
        Commands::Db { command } => run_db(&config, command).await,
        Commands::Sync { command } => sync::run(&config, command).await,
        Commands::Overrides { command } => overrides::run(&config, command).await,
        Commands::Products { command } => products::run(&config, command).await,
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub(crate) async fn connect(config: &wscat_core::AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool = wscat_db::connect_pool_from_config(config).await?;
    Ok(pool)
}

async fn run_db(config: &wscat_core::AppConfig, command: DbCommands) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    match command {
        DbCommands::Ping => {
            wscat_db::health_check(&pool).await?;
            println!("database reachable");
        }
        DbCommands::Migrate => {
            let applied = wscat_db::run_migrations(&pool).await?;
            println!("migrations up to date ({applied} applied)");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
