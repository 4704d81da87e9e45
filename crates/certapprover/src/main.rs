//! certapprover - policy-driven approval of certificate requests
//!
//! Loads Rego policy files given on the command line, then approves every
//! pending certificate request the policy allows.

use certapprover::config::DaemonConfig;
use certapprover::error::{DaemonError, DaemonResult};
use certapprover::Server;
use certapprover_policy::{PolicySources, RegoPolicy};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// certapprover CLI
#[derive(Parser)]
#[command(name = "certapprover")]
#[command(about = "Approves certificate requests allowed by a Rego policy", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CERTAPPROVER_CONFIG")]
    config: Option<String>,

    /// Listen address (overrides the configuration file)
    #[arg(short, long, env = "CERTAPPROVER_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level
    #[arg(long, env = "CERTAPPROVER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "CERTAPPROVER_LOG_JSON")]
    json: bool,

    /// Rego policy files, evaluated together as one program
    policies: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if cli.policies.is_empty() {
        tracing::info!("no policy loaded, exit early");
        return Ok(());
    }

    let sources = PolicySources::from_files(&cli.policies)?;
    let policy = RegoPolicy::compile(&sources).inspect_err(|e| {
        tracing::error!(error = %e, "Unable to load policy");
    })?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        modules = sources.len(),
        listen = %config.server.listen_addr,
        "Starting certapprover"
    );

    Server::new(config, Arc::new(policy)).run().await
}
