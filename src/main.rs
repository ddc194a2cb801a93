//! Persona server binary entry point

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use persona_server::cli::{Cli, Commands, ConfigSubcommand};
use persona_server::config::{self, AppConfig};
use persona_server::error::{Error, Result};
use persona_server::http::{self, AppState};
use persona_server::provider::OpenAiProvider;
use persona_server::{logging, store};

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    match &cli.command {
        Commands::Version => {
            println!("persona-server {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Config { subcommand } => {
            // Config commands use minimal logging
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone());
        }
        Commands::Run { .. } => {}
    }

    let config_path = match &cli.command {
        Commands::Run { config } => config.clone(),
        _ => None,
    };

    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprint!("{}", e.format_for_terminal());
            std::process::exit(1);
        }
    };

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.server.bind,
        model = %config.provider.model,
        "Starting persona server"
    );

    run_server(config)
}

/// Build the runtime and serve until the listener fails or the process is
/// interrupted.
fn run_server(config: AppConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().min(8))
        .thread_name("persona-server")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async {
        let pool = store::connect(&config.database.url).await?;
        info!(url = %config.database.url, "Database ready");

        let provider = Arc::new(OpenAiProvider::new(config.provider.clone())?);
        let state = AppState::new(&config, pool, provider);

        let bind = config
            .server
            .bind
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address: {}", e)))?;

        http::serve(bind, state).await
    })
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = AppConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration written to {}", written.display());
        }
        ConfigSubcommand::Validate { config } => match AppConfig::load(config.as_deref()) {
            Ok(_) => {
                println!("Configuration is valid.");
            }
            Err(e) => {
                eprint!("{}", e.format_for_terminal());
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
