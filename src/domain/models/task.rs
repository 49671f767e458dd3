//! Core scheduler entities: the immutable request, the pending queue
//! entry, the client-facing summary, the per-attempt run record, and
//! output chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dimensions::TaskDimensions;

/// An immutable description of work to do. Once created a `TaskRequest`
/// is never mutated; every other entity references it by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub id: Uuid,
    pub name: String,
    pub commands: Vec<Vec<String>>,
    pub dimensions: TaskDimensions,
    pub priority: u8,
    pub properties_hash: String,
    pub dimensions_hash: String,
    pub created_ts: DateTime<Utc>,
    pub expiration_ts: DateTime<Utc>,
    pub execution_timeout: chrono::Duration,
    pub created_by: String,
}

/// A pending, unclaimed unit of dispatch. One row per `TaskRequest`
/// unless a retry creates a second (not implemented here; see
/// `try_number`). `reaped_ts` is the exclusivity gate: a bot claims the
/// row by atomically setting it from `NULL` to "now".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskToRun {
    pub request_id: Uuid,
    pub try_number: u32,
    pub queue_number: i64,
    pub expiration_ts: DateTime<Utc>,
    pub reaped_ts: Option<DateTime<Utc>>,
    pub reaped_by: Option<String>,
}

impl TaskToRun {
    pub const fn is_claimed(&self) -> bool {
        self.reaped_ts.is_some()
    }
}

/// Terminal and non-terminal states of a task's lifecycle. See
/// [`TaskStatus::valid_transitions`] for the allowed edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    TimedOut,
    BotDied,
    Expired,
    Canceled,
}

impl TaskStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::TimedOut | Self::BotDied | Self::Expired | Self::Canceled
        )
    }

    /// The states this status may transition into. Terminal states have
    /// no outgoing edges.
    pub const fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Running, Self::Expired, Self::Canceled],
            Self::Running => &[Self::Completed, Self::TimedOut, Self::BotDied, Self::Canceled],
            Self::Completed | Self::TimedOut | Self::BotDied | Self::Expired | Self::Canceled => &[],
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::TimedOut => "TIMED_OUT",
            Self::BotDied => "BOT_DIED",
            Self::Expired => "EXPIRED",
            Self::Canceled => "CANCELED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "COMPLETED" => Some(Self::Completed),
            "TIMED_OUT" => Some(Self::TimedOut),
            "BOT_DIED" => Some(Self::BotDied),
            "EXPIRED" => Some(Self::Expired),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }
}

/// The client-facing view of a task: one row per `TaskRequest`,
/// reflecting whichever attempt is current. `name`/`user`/`priority` are
/// copied from the owning `TaskRequest` at creation time so list queries
/// never need to join back to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultSummary {
    pub request_id: Uuid,
    pub name: String,
    pub user: String,
    pub priority: u8,
    pub status: TaskStatus,
    /// Set once a terminal state is reached. `false` for a COMPLETED run
    /// whose commands all exited zero; `true` for every other terminal
    /// state.
    pub failure: bool,
    pub try_number: u32,
    pub bot_id: Option<String>,
    pub created_ts: DateTime<Utc>,
    pub modified_ts: DateTime<Utc>,
    pub started_ts: Option<DateTime<Utc>>,
    /// Set when a terminal state is reached after the task had actually
    /// started running (COMPLETED, TIMED_OUT, BOT_DIED, or CANCELED
    /// while RUNNING).
    pub completed_ts: Option<DateTime<Utc>>,
    /// Set when a terminal state is reached without the task ever having
    /// started (EXPIRED, or CANCELED while still PENDING).
    pub abandoned_ts: Option<DateTime<Utc>>,
    pub exit_codes: Vec<Option<i32>>,
}

impl TaskResultSummary {
    pub fn new(request_id: Uuid, name: String, user: String, priority: u8, now: DateTime<Utc>) -> Self {
        Self {
            request_id,
            name,
            user,
            priority,
            status: TaskStatus::Pending,
            failure: false,
            try_number: 0,
            bot_id: None,
            created_ts: now,
            modified_ts: now,
            started_ts: None,
            completed_ts: None,
            abandoned_ts: None,
            exit_codes: Vec::new(),
        }
    }

    /// Apply a status transition, validating it against the FSM.
    /// Returns the rejected pair as an error instead of mutating on failure.
    pub fn transition_to(&mut self, next: TaskStatus, now: DateTime<Utc>) -> Result<(), (TaskStatus, TaskStatus)> {
        if !self.status.can_transition_to(next) {
            return Err((self.status, next));
        }
        self.status = next;
        self.modified_ts = now;
        if next == TaskStatus::Running && self.started_ts.is_none() {
            self.started_ts = Some(now);
        }
        if next.is_terminal() {
            if self.started_ts.is_some() {
                self.completed_ts = Some(now);
            } else {
                self.abandoned_ts = Some(now);
            }
            self.failure = if next == TaskStatus::Completed {
                self.exit_codes.iter().any(|code| matches!(code, Some(c) if *c != 0))
            } else {
                true
            };
        }
        Ok(())
    }
}

/// The per-attempt execution record. Exists once a bot has claimed the
/// corresponding `TaskToRun`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunResult {
    pub request_id: Uuid,
    pub try_number: u32,
    pub bot_id: String,
    pub status: TaskStatus,
    pub started_ts: DateTime<Utc>,
    pub last_update_ts: DateTime<Utc>,
    pub completed_ts: Option<DateTime<Utc>>,
    pub current_command_index: usize,
    pub exit_codes: Vec<Option<i32>>,
    pub output_tail_offset: u64,
}

impl TaskRunResult {
    pub fn new(request_id: Uuid, try_number: u32, bot_id: String, now: DateTime<Utc>, command_count: usize) -> Self {
        Self {
            request_id,
            try_number,
            bot_id,
            status: TaskStatus::Running,
            started_ts: now,
            last_update_ts: now,
            completed_ts: None,
            current_command_index: 0,
            exit_codes: vec![None; command_count],
            output_tail_offset: 0,
        }
    }

    /// The command currently executing has already recorded an exit
    /// code and the update pipeline would be writing to it after the
    /// fact; see [`crate::services::update_pipeline`].
    pub fn command_already_completed(&self, command_index: usize) -> bool {
        self.exit_codes.get(command_index).is_some_and(Option::is_some)
    }
}

/// A fixed-size, append-only segment of a single command's combined
/// stdout/stderr stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutputChunk {
    pub request_id: Uuid,
    pub try_number: u32,
    pub command_index: usize,
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Output chunks are capped at this size; a bot that has more to send
/// splits it across multiple chunk writes at increasing offsets.
pub const OUTPUT_CHUNK_SIZE: usize = 100 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_go_running_expired_or_canceled() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Expired));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Canceled));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn running_can_go_to_any_terminal_state() {
        for terminal in [TaskStatus::Completed, TaskStatus::TimedOut, TaskStatus::BotDied, TaskStatus::Canceled] {
            assert!(TaskStatus::Running.can_transition_to(terminal));
        }
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn terminal_states_are_sticky() {
        for terminal in [
            TaskStatus::Completed,
            TaskStatus::TimedOut,
            TaskStatus::BotDied,
            TaskStatus::Expired,
            TaskStatus::Canceled,
        ] {
            assert!(terminal.valid_transitions().is_empty());
            assert!(terminal.is_terminal());
        }
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::TimedOut,
            TaskStatus::BotDied,
            TaskStatus::Expired,
            TaskStatus::Canceled,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
    }

    fn sample_summary(now: DateTime<Utc>) -> TaskResultSummary {
        TaskResultSummary::new(Uuid::new_v4(), "build".to_string(), "alice".to_string(), 100, now)
    }

    #[test]
    fn summary_transition_sets_started_and_completed_timestamps() {
        let now = Utc::now();
        let mut summary = sample_summary(now);
        let running_at = now + chrono::Duration::seconds(1);
        summary.transition_to(TaskStatus::Running, running_at).unwrap();
        assert_eq!(summary.started_ts, Some(running_at));
        assert!(summary.completed_ts.is_none());

        let done_at = running_at + chrono::Duration::seconds(1);
        summary.transition_to(TaskStatus::Completed, done_at).unwrap();
        assert_eq!(summary.completed_ts, Some(done_at));
        assert!(summary.abandoned_ts.is_none());
        assert!(!summary.failure);
    }

    #[test]
    fn summary_rejects_invalid_transition() {
        let now = Utc::now();
        let mut summary = sample_summary(now);
        let err = summary.transition_to(TaskStatus::Completed, now).unwrap_err();
        assert_eq!(err, (TaskStatus::Pending, TaskStatus::Completed));
        assert_eq!(summary.status, TaskStatus::Pending);
    }

    #[test]
    fn completed_with_nonzero_exit_code_is_a_failure() {
        let now = Utc::now();
        let mut summary = sample_summary(now);
        summary.transition_to(TaskStatus::Running, now).unwrap();
        summary.exit_codes = vec![Some(1)];
        summary.transition_to(TaskStatus::Completed, now).unwrap();
        assert!(summary.failure);
        assert!(summary.completed_ts.is_some());
    }

    #[test]
    fn expiring_a_never_started_task_sets_abandoned_ts_not_completed_ts() {
        let now = Utc::now();
        let mut summary = sample_summary(now);
        summary.transition_to(TaskStatus::Expired, now).unwrap();
        assert!(summary.abandoned_ts.is_some());
        assert!(summary.completed_ts.is_none());
        assert!(summary.failure);
    }

    #[test]
    fn run_result_tracks_per_command_completion() {
        let run = TaskRunResult::new(Uuid::new_v4(), 1, "bot-1".to_string(), Utc::now(), 2);
        assert!(!run.command_already_completed(0));
        assert!(!run.command_already_completed(1));
    }
}
