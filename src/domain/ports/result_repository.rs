//! Persistence ports for `TaskResultSummary`, `TaskRunResult`, and the
//! output chunks a bot streams back.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::SchedulerResult;
use crate::domain::models::{TaskOutputChunk, TaskResultSummary, TaskRunResult, TaskStatus};

/// Optional filters for the client query surface. `None` leaves a
/// dimension unconstrained; the spec requires name/tag/state filters to
/// be mutually exclusive, enforced by the service layer before the
/// repository is called.
#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub name_prefix: Option<String>,
    pub state: Option<TaskStatus>,
}

#[async_trait]
pub trait ResultRepository: Send + Sync {
    async fn create_summary(&self, summary: &TaskResultSummary) -> SchedulerResult<()>;

    async fn get_summary(&self, request_id: Uuid) -> SchedulerResult<Option<TaskResultSummary>>;

    /// Replace a summary wholesale. Callers must have validated the FSM
    /// transition with [`TaskStatus::can_transition_to`] beforehand;
    /// this does not re-check it.
    async fn update_summary(&self, summary: &TaskResultSummary) -> SchedulerResult<()>;

    async fn list_summaries(&self, filter: ResultFilter, limit: usize) -> SchedulerResult<Vec<TaskResultSummary>>;

    async fn create_run_result(&self, run: &TaskRunResult) -> SchedulerResult<()>;

    async fn get_run_result(&self, request_id: Uuid, try_number: u32) -> SchedulerResult<Option<TaskRunResult>>;

    async fn update_run_result(&self, run: &TaskRunResult) -> SchedulerResult<()>;

    /// Run results whose `last_update_ts` has passed `now - timeout` and
    /// are still `RUNNING`, for the sweeper's `BOT_DIED` pass.
    async fn list_stale_running(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
        limit: usize,
    ) -> SchedulerResult<Vec<TaskRunResult>>;

    async fn append_output_chunk(&self, chunk: &TaskOutputChunk) -> SchedulerResult<()>;

    /// The bytes of the chunk at exactly this offset, or `None` if no
    /// chunk starts there. Used by the update pipeline to decide whether
    /// a resend at an already-written offset is an idempotent retry.
    async fn get_chunk(
        &self,
        request_id: Uuid,
        try_number: u32,
        command_index: usize,
        offset: u64,
    ) -> SchedulerResult<Option<Vec<u8>>>;

    async fn get_output(&self, request_id: Uuid, try_number: u32, command_index: usize) -> SchedulerResult<Vec<u8>>;

    async fn get_all_outputs(&self, request_id: Uuid, try_number: u32) -> SchedulerResult<Vec<(usize, Vec<u8>)>>;
}
