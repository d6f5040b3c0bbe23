use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{theme::ColorfulTheme, Select};
use dotenv::dotenv;
use std::sync::Arc;
use tracing::info;

use sign_project::config::SignConfig;
use sign_project::constants::Network;
use sign_project::database::SchemaStore;
use sign_project::runner::{Coordinator, Mode};
use sign_project::utils::credentials::{CredentialSource, FailedKeys};
use sign_project::utils::retry::{RetryGovernor, RetryPolicy};
use sign_project::utils::setup_logger;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Skip the interactive prompt and run this mode
    #[arg(long, value_enum)]
    mode: Option<Mode>,
    /// Skip the interactive prompt and run on this network
    #[arg(long, value_enum)]
    network: Option<Network>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = setup_logger();
    // Keep guard alive for file logging
    std::mem::forget(_log_guard);
    dotenv().ok();

    let args = Args::parse();
    info!("Loading config from: {}", args.config);

    let config = SignConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    let mode = match args.mode {
        Some(mode) => mode,
        None => {
            let choice = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Select mode")
                .items(&["Create schemas", "Create attestations"])
                .default(0)
                .interact()?;
            if choice == 0 {
                Mode::Schemas
            } else {
                Mode::Attestations
            }
        }
    };

    let network = match args.network {
        Some(network) => network,
        None => {
            let labels: Vec<&str> = Network::ALL.iter().map(|n| n.label()).collect();
            let choice = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Select network")
                .items(&labels)
                .default(0)
                .interact()?;
            Network::ALL[choice]
        }
    };

    info!("Mode: {} | Network: {}", mode, network.label());

    let store = Arc::new(SchemaStore::new(&config.database_file).await?);
    let credentials = Arc::new(CredentialSource::load(&config.private_key_file)?);

    let failed_keys = Arc::new(FailedKeys::new(&config.failed_keys_file));
    let governor = Arc::new(RetryGovernor::new(RetryPolicy::default(), failed_keys));

    Coordinator::new(config, mode, network, store, credentials, governor)
        .run()
        .await?;

    Ok(())
}
