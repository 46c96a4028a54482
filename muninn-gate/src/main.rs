#![forbid(unsafe_code)]

use clap::Parser;
use muninn_gate_lib::config::{load_from_path, LoggingConfig};
use muninn_gate_lib::gateway;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Muninn gate (per-client admission control)")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", default_value = "config/basic.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match load_from_path(&cli.config) {
        Ok(cfg) => {
            init_tracing(&cfg.logging);
            info!(?cfg.listen, upstream = %cfg.upstream, "configuration loaded");
            match &cfg.limit {
                Some(limit) => info!(
                    refill_every_ms = limit.refill_every_ms,
                    burst = limit.burst,
                    max_keys = limit.effective_max_keys(),
                    "admission control enabled"
                ),
                None => info!("admission control disabled, forwarding only"),
            }
            let cfg = Arc::new(cfg);
            if let Err(err) = gateway::run(cfg.clone()).await {
                error!(%err, "gate exited with error");
                std::process::exit(1);
            }
        }
        Err(err) => {
            init_tracing(&LoggingConfig::default());
            error!(%err, "failed to load configuration");
            std::process::exit(1);
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(logging.show_target)
        .init();
}
