//! `bot_update_task`: the idempotent incremental update a bot sends
//! while (and after) executing a claimed task.

use uuid::Uuid;

use crate::domain::error::{SchedulerError, SchedulerResult};
use crate::domain::models::{TaskOutputChunk, TaskStatus, OUTPUT_CHUNK_SIZE};

use super::SchedulerService;

/// One incremental update from a bot. `output` is appended at `output_offset`;
/// `exit_code` is set only once the command has finished.
#[derive(Debug, Clone)]
pub struct BotUpdate {
    pub request_id: Uuid,
    pub try_number: u32,
    pub bot_id: String,
    pub command_index: usize,
    pub output_offset: u64,
    pub output: Vec<u8>,
    pub exit_code: Option<i32>,
}

impl SchedulerService {
    /// Apply one `bot_update_task` increment. Idempotent: re-sending the
    /// same offset/exit_code pair is a no-op success, not an error.
    ///
    /// Output is append-only against `run.output_tail_offset`: a chunk
    /// landing exactly at the tail extends it; one landing before the
    /// tail is a resend and is accepted only if its bytes match what was
    /// already recorded at that offset; one landing past the tail would
    /// leave a gap and is rejected.
    pub async fn bot_update_task(&self, update: BotUpdate) -> SchedulerResult<()> {
        if update.output.len() > OUTPUT_CHUNK_SIZE {
            return Err(SchedulerError::Validation(format!(
                "output chunk of {} bytes exceeds the {OUTPUT_CHUNK_SIZE}-byte limit",
                update.output.len()
            )));
        }

        let mut run = self
            .results
            .get_run_result(update.request_id, update.try_number)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(format!("run result for {}", update.request_id)))?;

        if run.bot_id != update.bot_id {
            return Err(SchedulerError::Auth(format!(
                "bot {} does not own this run, {} does",
                update.bot_id, run.bot_id
            )));
        }

        if run.command_already_completed(update.command_index) && !update.output.is_empty() {
            return Err(SchedulerError::Conflict(format!(
                "command {} already recorded an exit code; no further output accepted",
                update.command_index
            )));
        }

        let now = self.clock.now();

        let mut chunk_to_write = None;
        if !update.output.is_empty() {
            if update.output_offset > run.output_tail_offset {
                return Err(SchedulerError::Conflict(format!(
                    "output offset {} leaves a gap after the recorded tail at {}",
                    update.output_offset, run.output_tail_offset
                )));
            } else if update.output_offset < run.output_tail_offset {
                let existing = self
                    .results
                    .get_chunk(update.request_id, update.try_number, update.command_index, update.output_offset)
                    .await?;
                if existing.as_deref() != Some(update.output.as_slice()) {
                    return Err(SchedulerError::Conflict(format!(
                        "resent output at offset {} differs from what was already recorded",
                        update.output_offset
                    )));
                }
            } else {
                let new_tail = update.output_offset + update.output.len() as u64;
                chunk_to_write = Some(TaskOutputChunk {
                    request_id: update.request_id,
                    try_number: update.try_number,
                    command_index: update.command_index,
                    offset: update.output_offset,
                    data: update.output,
                });
                run.output_tail_offset = new_tail;
            }
        }

        if let Some(exit_code) = update.exit_code {
            if run.command_already_completed(update.command_index) {
                let existing = run.exit_codes[update.command_index];
                if existing != Some(exit_code) {
                    return Err(SchedulerError::Conflict(format!(
                        "command {} already completed with exit code {:?}, got {exit_code}",
                        update.command_index, existing
                    )));
                }
            } else {
                run.exit_codes[update.command_index] = Some(exit_code);
                run.current_command_index = (update.command_index + 1).min(run.exit_codes.len());
            }
        }

        run.last_update_ts = now;

        let all_done = run.exit_codes.iter().all(Option::is_some);
        if all_done {
            run.status = TaskStatus::Completed;
            run.completed_ts = Some(now);
        }

        let mut summary = self
            .results
            .get_summary(update.request_id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(format!("result summary for {}", update.request_id)))?;
        summary.exit_codes = run.exit_codes.clone();
        summary.modified_ts = now;
        if all_done {
            let _ = summary.transition_to(TaskStatus::Completed, now);
        }

        self.store.apply_bot_update(&run, &summary, chunk_to_write.as_ref(), all_done).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{StaticIdentity, TaskDimensions};
    use crate::services::reservation::PollOutcome;
    use crate::services::submission::NewTaskRequest;
    use crate::services::test_support::in_memory_service;
    use chrono::Duration;
    use std::collections::BTreeSet;

    async fn claimed_request(service: &SchedulerService) -> Uuid {
        let identity = StaticIdentity::anonymous();
        let mut dims = TaskDimensions::new();
        dims.insert("os".to_string(), "linux".to_string());
        let request = service
            .make_request(
                &identity,
                NewTaskRequest {
                    name: "t".to_string(),
                    commands: vec![vec!["echo".to_string()]],
                    dimensions: dims,
                    priority: 50,
                    expiration: Duration::minutes(5),
                    execution_timeout: Duration::minutes(10),
                },
            )
            .await
            .unwrap();

        let mut bot_dims = crate::domain::models::BotDimensions::new();
        bot_dims.insert("os".to_string(), BTreeSet::from(["linux".to_string()]));
        let outcome = service.poll("bot-1", "1", &bot_dims).await.unwrap();
        assert!(matches!(outcome, PollOutcome::Run { .. }));
        request.id
    }

    #[tokio::test]
    async fn completing_the_only_command_marks_summary_completed() {
        let (service, _clock) = in_memory_service().await;
        let request_id = claimed_request(&service).await;

        service
            .bot_update_task(BotUpdate {
                request_id,
                try_number: 1,
                bot_id: "bot-1".to_string(),
                command_index: 0,
                output_offset: 0,
                output: b"hi".to_vec(),
                exit_code: Some(0),
            })
            .await
            .unwrap();

        let summary = service.results.get_summary(request_id).await.unwrap().unwrap();
        assert_eq!(summary.status, TaskStatus::Completed);
        assert!(service.to_run.get(request_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn output_after_exit_code_is_a_conflict() {
        let (service, _clock) = in_memory_service().await;
        let request_id = claimed_request(&service).await;

        service
            .bot_update_task(BotUpdate {
                request_id,
                try_number: 1,
                bot_id: "bot-1".to_string(),
                command_index: 0,
                output_offset: 0,
                output: Vec::new(),
                exit_code: Some(0),
            })
            .await
            .unwrap();

        let err = service
            .bot_update_task(BotUpdate {
                request_id,
                try_number: 1,
                bot_id: "bot-1".to_string(),
                command_index: 0,
                output_offset: 2,
                output: b"late".to_vec(),
                exit_code: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::Conflict(_)));
    }

    #[tokio::test]
    async fn repeating_the_same_exit_code_is_idempotent() {
        let (service, _clock) = in_memory_service().await;
        let request_id = claimed_request(&service).await;

        for _ in 0..2 {
            service
                .bot_update_task(BotUpdate {
                    request_id,
                    try_number: 1,
                    bot_id: "bot-1".to_string(),
                    command_index: 0,
                    output_offset: 0,
                    output: Vec::new(),
                    exit_code: Some(0),
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn wrong_bot_id_is_rejected() {
        let (service, _clock) = in_memory_service().await;
        let request_id = claimed_request(&service).await;

        let err = service
            .bot_update_task(BotUpdate {
                request_id,
                try_number: 1,
                bot_id: "bot-2".to_string(),
                command_index: 0,
                output_offset: 0,
                output: Vec::new(),
                exit_code: Some(0),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Auth(_)));
    }

    #[tokio::test]
    async fn resending_the_same_bytes_at_an_already_written_offset_is_a_no_op() {
        let (service, _clock) = in_memory_service().await;
        let request_id = claimed_request(&service).await;

        service
            .bot_update_task(BotUpdate {
                request_id,
                try_number: 1,
                bot_id: "bot-1".to_string(),
                command_index: 0,
                output_offset: 0,
                output: b"hello".to_vec(),
                exit_code: None,
            })
            .await
            .unwrap();

        service
            .bot_update_task(BotUpdate {
                request_id,
                try_number: 1,
                bot_id: "bot-1".to_string(),
                command_index: 0,
                output_offset: 0,
                output: b"hello".to_vec(),
                exit_code: None,
            })
            .await
            .unwrap();

        let run = service.results.get_run_result(request_id, 1).await.unwrap().unwrap();
        assert_eq!(run.output_tail_offset, 5);
    }

    #[tokio::test]
    async fn resending_different_bytes_at_an_already_written_offset_is_a_conflict() {
        let (service, _clock) = in_memory_service().await;
        let request_id = claimed_request(&service).await;

        service
            .bot_update_task(BotUpdate {
                request_id,
                try_number: 1,
                bot_id: "bot-1".to_string(),
                command_index: 0,
                output_offset: 0,
                output: b"hello".to_vec(),
                exit_code: None,
            })
            .await
            .unwrap();

        let err = service
            .bot_update_task(BotUpdate {
                request_id,
                try_number: 1,
                bot_id: "bot-1".to_string(),
                command_index: 0,
                output_offset: 0,
                output: b"world".to_vec(),
                exit_code: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::Conflict(_)));
    }

    #[tokio::test]
    async fn output_past_the_tail_leaves_a_gap_and_is_a_conflict() {
        let (service, _clock) = in_memory_service().await;
        let request_id = claimed_request(&service).await;

        let err = service
            .bot_update_task(BotUpdate {
                request_id,
                try_number: 1,
                bot_id: "bot-1".to_string(),
                command_index: 0,
                output_offset: 10,
                output: b"late".to_vec(),
                exit_code: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::Conflict(_)));
    }
}
