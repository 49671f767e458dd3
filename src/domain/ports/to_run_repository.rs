//! Persistence port for `TaskToRun`, the pending dispatch queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::error::SchedulerResult;
use crate::domain::models::{TaskDimensions, TaskToRun};

/// A `TaskToRun` row joined with the dimensions of its owning request,
/// enough for the matcher to decide fit without a second query.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub to_run: TaskToRun,
    pub dimensions: TaskDimensions,
}

#[async_trait]
pub trait ToRunRepository: Send + Sync {
    async fn create(&self, to_run: &TaskToRun) -> SchedulerResult<()>;

    /// Up to `limit` unclaimed, unexpired rows ordered by `queue_number`
    /// ascending (highest priority, then oldest, first). This is the
    /// bounded candidate set the matcher scans per poll.
    async fn list_candidates(&self, limit: usize) -> SchedulerResult<Vec<Candidate>>;

    /// Atomically claim a row: `reaped_ts`/`reaped_by` transition from
    /// `NULL` exactly once. Returns `Ok(None)` if another bot won the
    /// race or the row has already expired.
    async fn claim(&self, request_id: Uuid, bot_id: &str, now: DateTime<Utc>) -> SchedulerResult<Option<TaskToRun>>;

    async fn get(&self, request_id: Uuid) -> SchedulerResult<Option<TaskToRun>>;

    async fn delete(&self, request_id: Uuid) -> SchedulerResult<()>;

    /// Idempotent: set `reaped_ts` to `now` without setting `reaped_by`,
    /// taking the row out of dispatch contention. A no-op if the row is
    /// already reaped (by a claim or a prior `abort`), so callers never
    /// need to check first. Used by cancellation and the sweeper, which
    /// must retire a row without pretending a bot claimed it.
    async fn abort(&self, request_id: Uuid, now: DateTime<Utc>) -> SchedulerResult<()>;

    /// All unclaimed rows whose `expiration_ts` has passed `now`, for
    /// the sweeper to expire.
    async fn list_expired(&self, now: DateTime<Utc>, limit: usize) -> SchedulerResult<Vec<TaskToRun>>;
}
