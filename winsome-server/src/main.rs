use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use winsome_core::config::Config;
use winsome_core::logging::{init_logging_with_config, LogConfig};
use winsome_core::metrics::init_metrics;
use winsome_core::shutdown::{install_signal_handlers, ShutdownCoordinator};
use winsome_core::Server;

#[derive(Parser, Debug)]
#[command(name = "winsome")]
#[command(author, version, about = "Winsome social network server", long_about = None)]
struct Args {
    /// TOML configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Override the persistence directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env().context("reading WINSOME_* environment overrides")?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    if let Some(dir) = args.data_dir {
        config.store.data_dir = dir;
    }
    config.validate().context("invalid configuration")?;

    if let Some(path) = args.dump_config {
        config.save_to_file(&path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    init_logging_with_config(LogConfig::try_from(&config.logging)?)?;
    init_metrics();

    let shutdown = Arc::new(ShutdownCoordinator::new());
    install_signal_handlers(shutdown.clone()).context("installing signal handlers")?;

    let server = Server::bind(config, shutdown).await?;
    info!(
        command = %server.command_addr()?,
        gateway = %server.gateway_addr()?,
        "Winsome server started"
    );

    let stats = server.run().await?;
    info!(users = stats.users, posts = stats.posts, "Winsome server stopped");
    Ok(())
}
