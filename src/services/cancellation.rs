//! Client-initiated cancellation.

use uuid::Uuid;

use crate::domain::error::{SchedulerError, SchedulerResult};
use crate::domain::models::TaskStatus;

use super::SchedulerService;

/// `(ok, was_running)`: `ok` is false only when the task was already in
/// a terminal state; `was_running` distinguishes a cancel that interrupted
/// an in-flight bot from one that simply removed a pending task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelOutcome {
    pub ok: bool,
    pub was_running: bool,
}

impl SchedulerService {
    pub async fn cancel_task(&self, request_id: Uuid) -> SchedulerResult<CancelOutcome> {
        let mut summary = self
            .results
            .get_summary(request_id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(format!("task {request_id}")))?;

        if summary.status.is_terminal() {
            return Ok(CancelOutcome { ok: false, was_running: false });
        }

        let was_running = summary.status == TaskStatus::Running;
        let now = self.clock.now();

        let mut run = if was_running {
            self.results.get_run_result(request_id, summary.try_number).await?
        } else {
            None
        };
        if let Some(run) = run.as_mut() {
            run.status = TaskStatus::Canceled;
            run.completed_ts = Some(now);
            run.last_update_ts = now;
        }

        summary
            .transition_to(TaskStatus::Canceled, now)
            .map_err(|(from, to)| SchedulerError::Conflict(format!("cannot transition {from:?} -> {to:?}")))?;

        self.store.cancel(&summary, run.as_ref(), now).await?;

        Ok(CancelOutcome { ok: true, was_running })
    }
}
