//! Implementation of the `swarmd serve` command: runs the HTTP server
//! and the background expiration/timeout sweeper side by side.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::adapters::http::{SchedulerHttpConfig, SchedulerHttpServer};
use crate::adapters::sqlite::{
    all_embedded_migrations, create_pool, Migrator, PoolConfig, SqliteBotRepository, SqliteRequestRepository,
    SqliteResultRepository, SqliteToRunRepository, SqliteTransactionalStore,
};
use crate::domain::models::config::Config;
use crate::domain::models::SystemClock;
use crate::services::{PollTuning, SchedulerService};

pub async fn execute(config: Config, port_override: Option<u16>) -> Result<()> {
    let database_url = format!("sqlite:{}", config.database.path);
    let pool_config = PoolConfig { max_connections: config.database.max_connections, ..PoolConfig::default() };
    let pool = create_pool(&database_url, Some(pool_config)).await.context("failed to open database pool")?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await.context("failed to run migrations")?;

    let poll_tuning = PollTuning {
        server_version: config.bot.protocol_version.clone(),
        backoff_base: StdDuration::from_secs(config.backoff.base_secs),
        backoff_max: StdDuration::from_secs(config.backoff.max_secs),
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

    let sweeper_service = service.clone();
    let bot_death_timeout = chrono::Duration::seconds(i64::try_from(config.sweeper.bot_death_timeout_secs).unwrap_or(i64::MAX));
    let sweep_interval = StdDuration::from_secs(config.sweeper.interval_secs);
    let sweeper_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            match sweeper_service.sweep(bot_death_timeout).await {
                Ok(report) => {
                    tracing::info!(expired = report.expired, bot_died = report.bot_died, "sweep complete");
                }
                Err(err) => tracing::error!(error = %err, "sweep failed"),
            }
        }
    });

    let http_config = SchedulerHttpConfig {
        host: config.server.host,
        port: port_override.unwrap_or(config.server.port),
        enable_cors: config.server.enable_cors,
    };
    let server = SchedulerHttpServer::new(service, http_config);

    tokio::select! {
        res = server.serve() => {
            sweeper_handle.abort();
            res.map_err(|e| anyhow::anyhow!("{e}"))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            sweeper_handle.abort();
        }
    }

    Ok(())
}
