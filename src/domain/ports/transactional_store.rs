//! Cross-entity writes that must commit atomically.
//!
//! `RequestRepository`/`ToRunRepository`/`ResultRepository` each own a
//! single entity family and are free to write independently. A handful
//! of operations move more than one of those families together — submit,
//! claim, bot update, cancel — and need a real multi-row commit so a
//! crash between writes can never leave the three tables disagreeing
//! about a task's state. This port is reserved for exactly those spots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::error::SchedulerResult;
use crate::domain::models::{TaskOutputChunk, TaskRequest, TaskResultSummary, TaskRunResult, TaskToRun};

#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Insert the request, its initial dispatch row, and its summary in
    /// one commit.
    async fn submit_task(
        &self,
        request: &TaskRequest,
        to_run: &TaskToRun,
        summary: &TaskResultSummary,
    ) -> SchedulerResult<()>;

    /// Attempt the claim CAS and, only if it wins, create the run result
    /// and write the RUNNING summary in the same commit. Returns `false`
    /// if another bot won the race; the caller moves on to the next
    /// candidate without touching `run`/`summary`.
    async fn claim_and_start(
        &self,
        request_id: Uuid,
        bot_id: &str,
        now: DateTime<Utc>,
        run: &TaskRunResult,
        summary: &TaskResultSummary,
    ) -> SchedulerResult<bool>;

    /// Write the run result, the summary, an optional output chunk, and
    /// (if `finished`) abort the dispatch row, all in one commit.
    async fn apply_bot_update(
        &self,
        run: &TaskRunResult,
        summary: &TaskResultSummary,
        chunk: Option<&TaskOutputChunk>,
        finished: bool,
    ) -> SchedulerResult<()>;

    /// Persist the canceled summary, the owning run result if the task
    /// was running, and abort the dispatch row, all in one commit.
    async fn cancel(
        &self,
        summary: &TaskResultSummary,
        run: Option<&TaskRunResult>,
        now: DateTime<Utc>,
    ) -> SchedulerResult<()>;
}
