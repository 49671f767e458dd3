//! `make_request`: validate, clamp, and transactionally enqueue a new task.

use uuid::Uuid;

use crate::domain::error::{SchedulerError, SchedulerResult};
use crate::domain::models::{
    dimensions_hash, properties_hash, queue_number, validate_task_dimensions, Identity, TaskDimensions, TaskRequest,
    TaskResultSummary, TaskToRun,
};

use super::SchedulerService;

/// Caller's request payload, pre-validation.
#[derive(Debug, Clone)]
pub struct NewTaskRequest {
    pub name: String,
    pub commands: Vec<Vec<String>>,
    pub dimensions: TaskDimensions,
    pub priority: u8,
    pub expiration: chrono::Duration,
    pub execution_timeout: chrono::Duration,
}

/// Non-privileged callers may not submit above this priority (lower
/// number is higher priority); requests above it are clamped, not
/// rejected.
const MAX_UNPRIVILEGED_PRIORITY: u8 = 100;

impl SchedulerService {
    /// Validate, clamp, and persist a new task request plus its initial
    /// `TaskToRun` and `TaskResultSummary` rows in one logical unit.
    pub async fn make_request(
        &self,
        identity: &dyn Identity,
        new_request: NewTaskRequest,
    ) -> SchedulerResult<TaskRequest> {
        if new_request.commands.is_empty() {
            return Err(SchedulerError::Validation("a task must have at least one command".to_string()));
        }
        validate_task_dimensions(&new_request.dimensions)
            .map_err(|e| SchedulerError::Validation(e.to_string()))?;

        let priority = if identity.is_privileged() {
            new_request.priority
        } else {
            new_request.priority.max(MAX_UNPRIVILEGED_PRIORITY)
        };

        let now = self.clock.now();
        let request = TaskRequest {
            id: Uuid::new_v4(),
            name: new_request.name,
            properties_hash: properties_hash(&new_request.dimensions, &new_request.commands),
            dimensions_hash: dimensions_hash(&new_request.dimensions),
            commands: new_request.commands,
            dimensions: new_request.dimensions,
            priority,
            created_ts: now,
            expiration_ts: now + new_request.expiration,
            execution_timeout: new_request.execution_timeout,
            created_by: identity.id().to_string(),
        };

        let to_run = TaskToRun {
            request_id: request.id,
            try_number: 1,
            queue_number: queue_number(priority, now.timestamp_millis()),
            expiration_ts: request.expiration_ts,
            reaped_ts: None,
            reaped_by: None,
        };
        let summary =
            TaskResultSummary::new(request.id, request.name.clone(), request.created_by.clone(), priority, now);

        self.store.submit_task(&request, &to_run, &summary).await?;

        Ok(request)
    }
}
