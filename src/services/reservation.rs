//! Reservation engine: a bot polls with its version and dimensions, the
//! service scans a bounded candidate window in dispatch order, and
//! claims the first row whose request dimensions are a subset of the
//! bot's. Also carries the rest of the bot poll protocol: version
//! mismatch, quarantine, and admin-initiated restart/terminate.

use uuid::Uuid;

use crate::domain::error::SchedulerResult;
use crate::domain::models::{matches, validate_bot_dimensions, BotDimensions, TaskRunResult, TaskStatus};
use crate::domain::ports::bot_repository::BotRecord;

use super::{PollBackoff, SchedulerService};

/// What a bot should do next, mirroring the bot poll protocol states.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// A task was claimed; the bot should execute it.
    Run { request_id: Uuid, try_number: u32, commands: Vec<Vec<String>> },
    /// Nothing matched, or the bot is quarantined; sleep before polling again.
    Sleep { duration_secs: u64 },
    /// The bot's protocol version doesn't match the server's; it should
    /// update itself before polling again.
    Update { server_version: String },
    /// Self- or server-initiated: the bot should restart its process.
    Restart { message: String },
    /// Admin-initiated: the bot should terminate after finishing (or
    /// abandoning) the named task.
    Terminate { request_id: Uuid },
}

impl SchedulerService {
    /// Scan up to `self.matcher_fanout` unclaimed candidates in queue
    /// order and claim the first one whose dimensions fit the bot.
    pub async fn poll(&self, bot_id: &str, version: &str, bot_dimensions: &BotDimensions) -> SchedulerResult<PollOutcome> {
        let now = self.clock.now();
        let mut record = self.bots.get_or_create(bot_id, version, now).await?;
        record.version = version.to_string();
        record.last_seen_ts = now;

        if version != self.poll_tuning.server_version {
            self.bots.touch(&record).await?;
            return Ok(PollOutcome::Update { server_version: self.poll_tuning.server_version.clone() });
        }

        if let Some(request_id) = record.pending_terminate_request_id {
            self.bots.clear_pending_directive(bot_id).await?;
            return Ok(PollOutcome::Terminate { request_id });
        }

        if let Some(message) = record.pending_restart_message.clone() {
            self.bots.clear_pending_directive(bot_id).await?;
            return Ok(PollOutcome::Restart { message });
        }

        if now - record.first_seen_ts >= self.poll_tuning.bot_max_lifetime {
            self.bots.touch(&record).await?;
            return Ok(PollOutcome::Restart { message: "bot exceeded its maximum lifetime".to_string() });
        }

        if let Err(err) = validate_bot_dimensions(bot_dimensions) {
            self.bots.quarantine(bot_id, &err.to_string()).await?;
            return self.sleep_outcome(&mut record).await;
        }
        if record.quarantined {
            return self.sleep_outcome(&mut record).await;
        }

        let candidates = self.to_run.list_candidates(self.matcher_fanout).await?;

        for candidate in candidates {
            if !matches(&candidate.dimensions, bot_dimensions) {
                continue;
            }

            let Some(request) = self.requests.get(candidate.to_run.request_id).await? else { continue };
            let Some(mut summary) = self.results.get_summary(candidate.to_run.request_id).await? else { continue };
            if summary.transition_to(TaskStatus::Running, now).is_err() {
                continue;
            }
            summary.bot_id = Some(bot_id.to_string());
            summary.try_number = candidate.to_run.try_number;

            let run = TaskRunResult::new(
                candidate.to_run.request_id,
                candidate.to_run.try_number,
                bot_id.to_string(),
                now,
                request.commands.len(),
            );

            let won = self
                .store
                .claim_and_start(candidate.to_run.request_id, bot_id, now, &run, &summary)
                .await?;
            if !won {
                continue;
            }

            record.sleep_streak = 0;
            self.bots.touch(&record).await?;

            return Ok(PollOutcome::Run {
                request_id: candidate.to_run.request_id,
                try_number: candidate.to_run.try_number,
                commands: request.commands,
            });
        }

        self.sleep_outcome(&mut record).await
    }

    /// Grow the bot's backoff by one step and persist the new streak.
    /// `PollBackoff`'s internal state isn't serializable, so it's
    /// reconstructed fresh each poll and fast-forwarded by the
    /// persisted streak before computing the real next duration.
    async fn sleep_outcome(&self, record: &mut BotRecord) -> SchedulerResult<PollOutcome> {
        let mut backoff = PollBackoff::new(self.poll_tuning.backoff_base, self.poll_tuning.backoff_max);
        for _ in 0..record.sleep_streak {
            backoff.next_sleep();
        }
        let sleep = backoff.next_sleep();
        record.sleep_streak = backoff.sleep_streak();
        self.bots.touch(record).await?;
        Ok(PollOutcome::Sleep { duration_secs: sleep.as_secs() })
    }

    /// Admin-initiated: the bot's next poll returns `Restart`.
    pub async fn request_bot_restart(&self, bot_id: &str, message: &str) -> SchedulerResult<()> {
        self.bots.request_restart(bot_id, message).await
    }

    /// Admin-initiated: the bot's next poll returns `Terminate`.
    pub async fn request_bot_terminate(&self, bot_id: &str, request_id: Uuid) -> SchedulerResult<()> {
        self.bots.request_terminate(bot_id, request_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{StaticIdentity, TaskDimensions};
    use crate::services::submission::NewTaskRequest;
    use crate::services::test_support::in_memory_service;
    use chrono::{Duration, Utc};
    use std::collections::BTreeSet;

    fn bot_dims(pairs: &[(&str, &str)]) -> BotDimensions {
        let mut map = BotDimensions::new();
        for (k, v) in pairs {
            map.entry((*k).to_string()).or_insert_with(BTreeSet::new).insert((*v).to_string());
        }
        map
    }

    #[tokio::test]
    async fn matching_bot_claims_pending_task() {
        let (service, _clock) = in_memory_service().await;
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

        let outcome = service.poll("bot-1", "1", &bot_dims(&[("os", "linux")])).await.unwrap();
        match outcome {
            PollOutcome::Run { request_id, .. } => assert_eq!(request_id, request.id),
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_matching_bot_sleeps() {
        let (service, _clock) = in_memory_service().await;
        let identity = StaticIdentity::anonymous();
        let mut dims = TaskDimensions::new();
        dims.insert("os".to_string(), "windows".to_string());
        service
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

        let outcome = service.poll("bot-1", "1", &bot_dims(&[("os", "linux")])).await.unwrap();
        assert!(matches!(outcome, PollOutcome::Sleep { .. }));
    }

    #[tokio::test]
    async fn second_bot_does_not_claim_same_task() {
        let (service, _clock) = in_memory_service().await;
        let identity = StaticIdentity::anonymous();
        let mut dims = TaskDimensions::new();
        dims.insert("os".to_string(), "linux".to_string());
        service
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

        let first = service.poll("bot-1", "1", &bot_dims(&[("os", "linux")])).await.unwrap();
        assert!(matches!(first, PollOutcome::Run { .. }));

        let second = service.poll("bot-2", "1", &bot_dims(&[("os", "linux")])).await.unwrap();
        assert!(matches!(second, PollOutcome::Sleep { .. }));
    }

    #[tokio::test]
    async fn mismatched_version_is_told_to_update() {
        let (service, _clock) = in_memory_service().await;
        let outcome = service.poll("bot-1", "0", &BotDimensions::new()).await.unwrap();
        assert!(matches!(outcome, PollOutcome::Update { .. }));
    }

    #[tokio::test]
    async fn pathological_dimensions_quarantine_the_bot_instead_of_erroring() {
        let (service, _clock) = in_memory_service().await;
        let mut huge = BotDimensions::new();
        for i in 0..16 {
            huge.insert(format!("key{i}"), BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string()]));
        }
        let outcome = service.poll("bot-1", "1", &huge).await.unwrap();
        assert!(matches!(outcome, PollOutcome::Sleep { .. }));

        let record = service.bots.get_or_create("bot-1", "1", Utc::now()).await.unwrap();
        assert!(record.quarantined);
    }

    #[tokio::test]
    async fn admin_restart_request_is_served_on_next_poll() {
        let (service, _clock) = in_memory_service().await;
        service.poll("bot-1", "1", &BotDimensions::new()).await.unwrap();
        service.request_bot_restart("bot-1", "please restart").await.unwrap();

        let outcome = service.poll("bot-1", "1", &BotDimensions::new()).await.unwrap();
        match outcome {
            PollOutcome::Restart { message } => assert_eq!(message, "please restart"),
            other => panic!("expected Restart, got {other:?}"),
        }

        let next = service.poll("bot-1", "1", &BotDimensions::new()).await.unwrap();
        assert!(matches!(next, PollOutcome::Sleep { .. }), "directive is one-shot");
    }
}
