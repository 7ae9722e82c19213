use aate::cli::{self, Cli, Commands};
use aate::config::AppConfig;
use aate::coordination::{install_signal_handlers, ShutdownHandle};
use aate::logging::init_logging;
use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match AppConfig::load_validated(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Refusing to start: {e}");
            std::process::exit(2);
        }
    };

    let _guard = match cli.command {
        Commands::Config => None,
        _ => Some(init_logging(&config.logging)),
    };
    info!(
        name = %config.app.name,
        mode = ?config.app.mode,
        store = ?config.store.backend,
        "Starting"
    );

    let shutdown = ShutdownHandle::new();
    install_signal_handlers(shutdown.clone());

    let result = cli::execute(cli.command, config, shutdown)
        .await
        .context("command failed");
    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "Exiting with error");
    }
    result
}
