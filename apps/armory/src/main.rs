//! # Armory - content registry CLI
//!
//! The main binary for the Armory content registry.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            apps/armory (THE BINARY)          │
//! │                                              │
//! │   ┌─────────────┐        ┌──────────────┐    │
//! │   │    CLI      │        │    Config    │    │
//! │   │   (clap)    │        │    (toml)    │    │
//! │   └──────┬──────┘        └──────┬───────┘    │
//! │          └───────────┬──────────┘            │
//! │                      ▼                       │
//! │              ┌───────────────┐               │
//! │              │  armory-core  │               │
//! │              │  (THE LOGIC)  │               │
//! │              └───────────────┘               │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! armory init
//! armory load-pack -f core_rules.json
//! armory import -t pilot -f ghost.json
//! armory sync -m mk1 -f lodestar.json
//! armory show -t mech -i mk1 --packed
//! ```

use armory::cli;
use armory::config::{ArmoryConfig, LogFormat};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let config = match ArmoryConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // ARMORY_LOG_FORMAT=json (or log_format = "json") enables machine-parseable output.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "armory=info,armory_core=info".into());

    match config.effective_log_format() {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli, config).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
