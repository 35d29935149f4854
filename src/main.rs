/*!
 * Podwatch daemon - command line entry point
 */

use anyhow::{Context, Result};
use clap::Parser;
use podwatch::{
    config::DaemonConfig,
    error::{EXIT_FATAL, EXIT_SUCCESS},
    logging, Daemon,
};
use std::path::PathBuf;
use tracing::{error, info};

/// Fault lifecycle cache and superpod topology reconciliation daemon.
#[derive(Parser, Debug)]
#[command(name = "podwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML); defaults apply when omitted
    #[arg(short, long, value_name = "FILE", env = "PODWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Override the HTTP ingress bind address
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_default_config: bool,
}

fn load_config(cli: &Cli) -> Result<DaemonConfig> {
    let mut config = match &cli.config {
        Some(path) => DaemonConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => DaemonConfig::default(),
    };

    if cli.debug {
        config.log.verbose = true;
    }
    if let Some(bind) = &cli.bind {
        config.api.bind = bind.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    if cli.print_default_config {
        print!("{}", DaemonConfig::default().to_toml()?);
        return Ok(());
    }

    let config = load_config(&cli)?;

    logging::init_logging(&config.log).context("Failed to initialize logging")?;

    let daemon = Daemon::build(config).context("Failed to build daemon")?;
    let cancel = daemon.cancellation_token();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(e) => error!(error = %e, "failed to listen for interrupt, shutting down"),
        }
        cancel.cancel();
    });

    daemon.run().await.context("Daemon failed")?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_FATAL
        }
    };

    std::process::exit(code);
}
