//! HDS Relay entry point

use clap::Parser;
use hds_relay::cli::{Cli, Commands};
use hds_relay_core::RelayConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            tracing::info!(version = %hds_relay::version::formatted(), "Starting HDS Relay");
            hds_relay::run(args.into_config()).await?;
        }

        Commands::Run { config } => {
            tracing::info!(
                version = %hds_relay::version::formatted(),
                config = %config.display(),
                "Starting HDS Relay"
            );
            let config = RelayConfig::from_file(&config)?;
            hds_relay::run(config).await?;
        }

        Commands::CheckConfig { config } => {
            match RelayConfig::from_file(&config).and_then(|c| c.validate().map(|_| c)) {
                Ok(config) => {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
                Err(e) => {
                    eprintln!("{}: {}", config.display(), e);
                    std::process::exit(if e.is_user_error() { 2 } else { 1 });
                }
            }
        }

        Commands::Version => {
            println!("hds-relay {}", hds_relay::version::formatted());
        }
    }

    Ok(())
}
