//! Persistence port for per-bot poll-protocol state.
//!
//! HTTP polling is stateless per request, but the protocol itself is
//! not: backoff streaks, quarantine, and admin directives all have to
//! survive across polls. One row per bot, created on its first poll.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::error::SchedulerResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotRecord {
    pub bot_id: String,
    pub version: String,
    pub quarantined: bool,
    pub quarantine_reason: Option<String>,
    pub sleep_streak: u32,
    pub pending_restart_message: Option<String>,
    pub pending_terminate_request_id: Option<Uuid>,
    pub first_seen_ts: DateTime<Utc>,
    pub last_seen_ts: DateTime<Utc>,
}

impl BotRecord {
    pub fn new(bot_id: String, version: String, now: DateTime<Utc>) -> Self {
        Self {
            bot_id,
            version,
            quarantined: false,
            quarantine_reason: None,
            sleep_streak: 0,
            pending_restart_message: None,
            pending_terminate_request_id: None,
            first_seen_ts: now,
            last_seen_ts: now,
        }
    }
}

#[async_trait]
pub trait BotRepository: Send + Sync {
    /// Fetch the bot's record, creating one with the given version if
    /// this is its first poll.
    async fn get_or_create(&self, bot_id: &str, version: &str, now: DateTime<Utc>) -> SchedulerResult<BotRecord>;

    /// Persist `record.version`/`last_seen_ts` and the backoff streak.
    async fn touch(&self, record: &BotRecord) -> SchedulerResult<()>;

    async fn quarantine(&self, bot_id: &str, reason: &str) -> SchedulerResult<()>;

    /// Admin-initiated: the next poll for this bot returns `Restart`
    /// instead of dispatching work.
    async fn request_restart(&self, bot_id: &str, message: &str) -> SchedulerResult<()>;

    /// Admin-initiated: the next poll for this bot returns `Terminate`.
    async fn request_terminate(&self, bot_id: &str, request_id: Uuid) -> SchedulerResult<()>;

    /// Clear a pending restart/terminate directive once it has been
    /// handed to the bot.
    async fn clear_pending_directive(&self, bot_id: &str) -> SchedulerResult<()>;
}
