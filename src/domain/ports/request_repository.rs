//! Persistence port for `TaskRequest`, the immutable description of work.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::SchedulerResult;
use crate::domain::models::TaskRequest;

#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Persist a new request. Requests are immutable after creation;
    /// there is no update method.
    async fn create(&self, request: &TaskRequest) -> SchedulerResult<()>;

    async fn get(&self, id: Uuid) -> SchedulerResult<Option<TaskRequest>>;

    /// List requests created by a given caller, newest first.
    async fn list_by_creator(&self, created_by: &str, limit: usize) -> SchedulerResult<Vec<TaskRequest>>;
}
