//! Backoffice - operator CLI
//!
//! Offline checks for an admin deployment: configuration and panel wiring,
//! exchange templates, exchange file rows and feature flags.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backoffice_panels::AdminConfig;

use cli::{Args, Commands};
use commands::Outcome;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("backoffice={},warn", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let outcome = match args.command {
        Commands::Template { format } => commands::template(format.into())?,
        command => {
            let config = AdminConfig::from_file(&args.config)?;
            info!(
                config = %args.config.display(),
                panels = config.panels.len(),
                "Configuration loaded"
            );
            run(config, command).await?
        }
    };

    println!("{}", outcome.output);
    if !outcome.ok {
        error!("Check failed");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(config: AdminConfig, command: Commands) -> Result<Outcome, error::CliError> {
    match command {
        Commands::Validate => commands::validate(config).await,
        Commands::CheckRows { file, format } => {
            commands::check_rows(&config, &file, format.map(Into::into)).await
        }
        Commands::Features => commands::features(&config),
        Commands::Template { format } => commands::template(format.into()),
    }
}
