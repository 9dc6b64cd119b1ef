//! Syslog relay CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use syslog_relay::config::{Config, LogFormat};
use syslog_relay::orchestrator::RelayService;

#[derive(Parser, Debug)]
#[command(name = "syslog-relay", about = "Lightweight syslog relay: listen, filter, transform, forward")]
struct Args {
    /// Path to the relay's YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate the configuration, then run the relay. This is the default.
    Run,
    /// Load and validate the configuration without starting the relay.
    Validate,
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match args.command.unwrap_or(Command::Run) {
        Command::Validate => {
            println!("configuration '{}' is valid", args.config.display());
            ExitCode::SUCCESS
        }
        Command::Run => {
            init_tracing(&config.service.log_level, config.service.log_format);

            let service = match RelayService::new(config) {
                Ok(service) => service,
                Err(e) => {
                    tracing::error!(error = %e, "failed to build relay service");
                    return ExitCode::FAILURE;
                }
            };

            if let Err(e) = service.run_forever().await {
                tracing::error!(error = %e, "relay exited with error");
                return ExitCode::FAILURE;
            }

            ExitCode::SUCCESS
        }
    }
}
