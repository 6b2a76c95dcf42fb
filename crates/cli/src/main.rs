//! WordPress hosting metrics CLI
//!
//! Queries the metrics aggregator for tenant task stats, resource rollups,
//! history, logs and the cluster overview.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{monitoring, tenants};
use metrics_engine::models::HistoryRange;

/// WordPress hosting metrics CLI
#[derive(Parser)]
#[command(name = "wpm")]
#[command(author, version, about = "CLI for the WordPress hosting metrics aggregator", long_about = None)]
pub struct Cli {
    /// Aggregator URL (overrides ~/.config/wpm/config.json)
    #[arg(long, env = "WPM_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show a tenant's tasks with per-container stats
    Tasks {
        /// Tenant identifier
        tenant: String,
    },

    /// Show a tenant's current resource usage
    Usage {
        tenant: String,
    },

    /// Show a tenant's CPU, memory and network history
    History {
        tenant: String,

        /// Window: 1H, 24H or 7D
        #[arg(long, short, default_value = "1H")]
        range: HistoryRange,
    },

    /// Show the cluster-wide overview
    Cluster,

    /// Check the time-series backend
    Health,

    /// Tail a tenant's service logs
    Logs {
        tenant: String,

        /// Number of lines (1-5000)
        #[arg(long, short = 'n', default_value_t = 100)]
        lines: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let api_url = config::Config::load()?.resolve_api_url(cli.api_url);
    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Tasks { tenant } => {
            tenants::show_tasks(&client, &tenant, cli.format).await?;
        }
        Commands::Usage { tenant } => {
            monitoring::show_usage(&client, &tenant, cli.format).await?;
        }
        Commands::History { tenant, range } => {
            monitoring::show_history(&client, &tenant, range, cli.format).await?;
        }
        Commands::Cluster => {
            monitoring::show_cluster(&client, cli.format).await?;
        }
        Commands::Health => {
            monitoring::show_health(&client, cli.format).await?;
        }
        Commands::Logs { tenant, lines } => {
            tenants::show_logs(&client, &tenant, lines, cli.format).await?;
        }
    }

    Ok(())
}
