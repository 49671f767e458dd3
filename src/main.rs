//! swarmd CLI entry point

use swarmd::{
    cli::{commands::{init, serve, sweep}, Cli, Commands},
    infrastructure::{config::ConfigLoader, logging::{LogConfig, LoggerImpl}},
};
use anyhow::{Context, Result};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `init` runs before any config/logging exists: it's what creates them.
    if let Commands::Init { force } = cli.command {
        init::execute(init::InitArgs { force, path: ".".into() }, cli.json).await?;
        return Ok(());
    }

    let config = ConfigLoader::load().context("failed to load configuration")?;

    let log_config = LogConfig {
        level: config.logging.level.clone(),
        format: if config.logging.format == "pretty" {
            swarmd::infrastructure::logging::LogFormat::Pretty
        } else {
            swarmd::infrastructure::logging::LogFormat::Json
        },
        log_dir: config.logging.log_dir.clone().map(Into::into),
        ..LogConfig::default()
    };
    let _logger = LoggerImpl::init(&log_config).context("failed to initialize logger")?;

    match cli.command {
        Commands::Init { .. } => unreachable!("init is handled before config/logging setup"),
        Commands::Serve { port } => serve::execute(config, port).await?,
        Commands::Sweep => sweep::execute(config, cli.json).await?,
    }

    Ok(())
}
