//! Implementation of the `swarmd init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::fs;

use crate::adapters::sqlite::initialize_database;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::config::Config;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config.yaml
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub config_path: PathBuf,
    pub database_initialized: bool,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if self.database_initialized {
            lines.push(format!("Config written to {}", self.config_path.display()));
            lines.push("Database migrated.".to_string());
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: InitArgs, json_mode: bool) -> Result<()> {
    let target = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir().context("failed to get current directory")?.join(&args.path)
    };

    let swarmd_dir = target.join(".swarmd");
    let config_path = swarmd_dir.join("config.yaml");

    if config_path.exists() && !args.force {
        output(
            &InitOutput {
                success: false,
                message: "Already initialized. Use --force to overwrite config.yaml.".to_string(),
                config_path,
                database_initialized: false,
            },
            json_mode,
        );
        return Ok(());
    }

    fs::create_dir_all(&swarmd_dir).await.context("failed to create .swarmd directory")?;

    let config = Config::default();
    let yaml = serde_yaml::to_string(&config).context("failed to serialize default config")?;
    fs::write(&config_path, yaml).await.context("failed to write config.yaml")?;

    let db_path = swarmd_dir.join("swarmd.db");
    let db_url = format!("sqlite:{}", db_path.display());
    initialize_database(&db_url).await.context("failed to initialize database")?;

    output(
        &InitOutput {
            success: true,
            message: "swarmd initialized.".to_string(),
            config_path,
            database_initialized: true,
        },
        json_mode,
    );
    Ok(())
}
