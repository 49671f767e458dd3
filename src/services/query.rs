//! Client query surface: result summaries, the originating request,
//! and streamed output.

use uuid::Uuid;

use crate::domain::error::{SchedulerError, SchedulerResult};
use crate::domain::models::{TaskRequest, TaskResultSummary, TaskStatus};
use crate::domain::ports::result_repository::ResultFilter;

use super::SchedulerService;

/// Client-facing listing filters. `name_prefix` and `state` are
/// mutually exclusive, matching the single-filter query surface.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub name_prefix: Option<String>,
    pub state: Option<TaskStatus>,
}

impl SchedulerService {
    pub async fn get_result_summary(&self, request_id: Uuid) -> SchedulerResult<Option<TaskResultSummary>> {
        self.results.get_summary(request_id).await
    }

    pub async fn get_request(&self, request_id: Uuid) -> SchedulerResult<Option<TaskRequest>> {
        self.requests.get(request_id).await
    }

    pub async fn get_output(&self, request_id: Uuid, try_number: u32, command_index: usize) -> SchedulerResult<Vec<u8>> {
        self.results.get_output(request_id, try_number, command_index).await
    }

    pub async fn get_all_outputs(&self, request_id: Uuid, try_number: u32) -> SchedulerResult<Vec<(usize, Vec<u8>)>> {
        self.results.get_all_outputs(request_id, try_number).await
    }

    pub async fn list_results(&self, query: ListQuery, limit: usize) -> SchedulerResult<Vec<TaskResultSummary>> {
        if query.name_prefix.is_some() && query.state.is_some() {
            return Err(SchedulerError::Validation(
                "name and state filters are mutually exclusive".to_string(),
            ));
        }

        self.results
            .list_summaries(ResultFilter { name_prefix: query.name_prefix, state: query.state }, limit)
            .await
    }
}
