//! Implementation of the `swarmd sweep` command: run one sweep pass and
//! exit, for cron-driven deployments (spec.md's "cron = single-writer
//! background task" pattern).

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::adapters::sqlite::{
    all_embedded_migrations, create_pool, Migrator, PoolConfig, SqliteBotRepository, SqliteRequestRepository,
    SqliteResultRepository, SqliteToRunRepository, SqliteTransactionalStore,
};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::config::Config;
use crate::domain::models::SystemClock;
use crate::services::{PollTuning, SchedulerService};

#[derive(Debug, serde::Serialize)]
pub struct SweepOutput {
    pub expired: usize,
    pub bot_died: usize,
}

impl CommandOutput for SweepOutput {
    fn to_human(&self) -> String {
        format!("expired {} task(s), declared {} bot(s) died", self.expired, self.bot_died)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(config: Config, json_mode: bool) -> Result<()> {
    let database_url = format!("sqlite:{}", config.database.path);
    let pool_config = PoolConfig { max_connections: config.database.max_connections, ..PoolConfig::default() };
    let pool = create_pool(&database_url, Some(pool_config)).await.context("failed to open database pool")?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await.context("failed to run migrations")?;

    let poll_tuning = PollTuning {
        server_version: config.bot.protocol_version.clone(),
        backoff_base: std::time::Duration::from_secs(config.backoff.base_secs),
        backoff_max: std::time::Duration::from_secs(config.backoff.max_secs),
        bot_max_lifetime: chrono::Duration::seconds(
            i64::try_from(config.bot.max_lifetime_secs).unwrap_or(i64::MAX),
        ),
    };

    let service = SchedulerService::new(
        Arc::new(SqliteRequestRepository::new(pool.clone())),
        Arc::new(SqliteToRunRepository::new(pool.clone())),
        Arc::new(SqliteResultRepository::new(pool.clone())),
        Arc::new(SqliteBotRepository::new(pool.clone())),
        Arc::new(SqliteTransactionalStore::new(pool)),
        Arc::new(SystemClock),
        config.matcher.candidate_fanout,
        poll_tuning,
    );

    let bot_death_timeout = chrono::Duration::seconds(i64::try_from(config.sweeper.bot_death_timeout_secs).unwrap_or(i64::MAX));
    let report = service.sweep(bot_death_timeout).await.context("sweep failed")?;

    output(&SweepOutput { expired: report.expired, bot_died: report.bot_died }, json_mode);
    Ok(())
}
