//! SQLite implementation of the `BotRepository` port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_uuid};
use crate::domain::error::SchedulerResult;
use crate::domain::ports::bot_repository::BotRecord;
use crate::domain::ports::BotRepository;

#[derive(Clone)]
pub struct SqliteBotRepository {
    pool: SqlitePool,
}

impl SqliteBotRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BotRow {
    bot_id: String,
    version: String,
    quarantined: i64,
    quarantine_reason: Option<String>,
    sleep_streak: i64,
    pending_restart_message: Option<String>,
    pending_terminate_request_id: Option<String>,
    first_seen_ts: String,
    last_seen_ts: String,
}

impl BotRow {
    fn into_domain(self) -> SchedulerResult<BotRecord> {
        Ok(BotRecord {
            bot_id: self.bot_id,
            version: self.version,
            quarantined: self.quarantined != 0,
            quarantine_reason: self.quarantine_reason,
            sleep_streak: u32::try_from(self.sleep_streak).unwrap_or(0),
            pending_restart_message: self.pending_restart_message,
            pending_terminate_request_id: self.pending_terminate_request_id.map(|s| parse_uuid(&s)).transpose()?,
            first_seen_ts: parse_datetime(&self.first_seen_ts)?,
            last_seen_ts: parse_datetime(&self.last_seen_ts)?,
        })
    }
}

#[async_trait]
impl BotRepository for SqliteBotRepository {
    async fn get_or_create(&self, bot_id: &str, version: &str, now: DateTime<Utc>) -> SchedulerResult<BotRecord> {
        if let Some(row) = self.fetch(bot_id).await? {
            return Ok(row);
        }
        sqlx::query(
            r"INSERT INTO bots (bot_id, version, quarantined, sleep_streak, first_seen_ts, last_seen_ts)
               VALUES (?, ?, 0, 0, ?, ?)
               ON CONFLICT (bot_id) DO NOTHING",
        )
        .bind(bot_id)
        .bind(version)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.fetch(bot_id)
            .await?
            .ok_or_else(|| {
                crate::domain::error::SchedulerError::Database(sqlx::Error::Protocol("bot row missing after insert".to_string()))
            })
    }

    async fn touch(&self, record: &BotRecord) -> SchedulerResult<()> {
        sqlx::query("UPDATE bots SET version = ?, sleep_streak = ?, last_seen_ts = ? WHERE bot_id = ?")
            .bind(&record.version)
            .bind(i64::from(record.sleep_streak))
            .bind(record.last_seen_ts.to_rfc3339())
            .bind(&record.bot_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn quarantine(&self, bot_id: &str, reason: &str) -> SchedulerResult<()> {
        sqlx::query("UPDATE bots SET quarantined = 1, quarantine_reason = ? WHERE bot_id = ?")
            .bind(reason)
            .bind(bot_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn request_restart(&self, bot_id: &str, message: &str) -> SchedulerResult<()> {
        sqlx::query("UPDATE bots SET pending_restart_message = ? WHERE bot_id = ?")
            .bind(message)
            .bind(bot_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn request_terminate(&self, bot_id: &str, request_id: Uuid) -> SchedulerResult<()> {
        sqlx::query("UPDATE bots SET pending_terminate_request_id = ? WHERE bot_id = ?")
            .bind(request_id.to_string())
            .bind(bot_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_pending_directive(&self, bot_id: &str) -> SchedulerResult<()> {
        sqlx::query(
            "UPDATE bots SET pending_restart_message = NULL, pending_terminate_request_id = NULL WHERE bot_id = ?",
        )
        .bind(bot_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl SqliteBotRepository {
    async fn fetch(&self, bot_id: &str) -> SchedulerResult<Option<BotRecord>> {
        let row: Option<BotRow> = sqlx::query_as("SELECT * FROM bots WHERE bot_id = ?")
            .bind(bot_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(BotRow::into_domain).transpose()
    }
}
