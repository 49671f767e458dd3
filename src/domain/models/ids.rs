//! Key packing for the scheduler's entity set.
//!
//! A task is identified to clients by one opaque string. Internally it
//! names either a `TaskResultSummary` row or, once a bot has been
//! assigned, the `TaskRunResult` row for that attempt. The packed id
//! carries a one-byte kind tag so either key can be told apart from the
//! string alone, without a database round trip.

use uuid::Uuid;

/// Which entity a packed task id resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskIdKind {
    Summary,
    RunResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId {
    pub request_id: Uuid,
    pub kind: TaskIdKind,
}

impl TaskId {
    pub const fn summary(request_id: Uuid) -> Self {
        Self { request_id, kind: TaskIdKind::Summary }
    }

    pub const fn run_result(request_id: Uuid) -> Self {
        Self { request_id, kind: TaskIdKind::RunResult }
    }

    /// Encode as `<hex-uuid><tag>`, tag = `0` for summary, `1` for run result.
    pub fn encode(&self) -> String {
        let tag = match self.kind {
            TaskIdKind::Summary => '0',
            TaskIdKind::RunResult => '1',
        };
        format!("{}{tag}", self.request_id.simple())
    }

    pub fn decode(packed: &str) -> Result<Self, TaskIdError> {
        if packed.len() != 33 {
            return Err(TaskIdError::WrongLength(packed.len()));
        }
        let (uuid_part, tag_part) = packed.split_at(32);
        let request_id = Uuid::parse_str(uuid_part).map_err(|_| TaskIdError::InvalidUuid)?;
        let kind = match tag_part {
            "0" => TaskIdKind::Summary,
            "1" => TaskIdKind::RunResult,
            other => return Err(TaskIdError::UnknownTag(other.to_string())),
        };
        Ok(Self { request_id, kind })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskIdError {
    #[error("packed task id has wrong length: {0}")]
    WrongLength(usize),
    #[error("packed task id has an invalid uuid segment")]
    InvalidUuid,
    #[error("packed task id has unknown kind tag: {0}")]
    UnknownTag(String),
}
