//! Proxy binary: load configuration, initialize observability, serve.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use prowlarr_llm_proxy::config::load_config;
use prowlarr_llm_proxy::observability::{logging, metrics};
use prowlarr_llm_proxy::{Shutdown, Startup};

#[derive(Debug, Parser)]
#[command(name = "prowlarr-llm-proxy", version, about = "Transparent multi-port HTTP proxy with exchange capture")]
struct Cli {
    /// TOML configuration file; environment variables override it.
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_logging(&config.observability, config.debug) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!(
        app_name = %config.app_name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                    return ExitCode::FAILURE;
                }
            }
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
                return ExitCode::FAILURE;
            }
        }
    }

    let ready = match Startup::new(config).bind().await {
        Ok(ready) => ready,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    match ready.serve(Shutdown::new()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Proxy terminated");
            ExitCode::FAILURE
        }
    }
}
