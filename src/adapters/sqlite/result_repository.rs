//! SQLite implementation of the `ResultRepository` port: result
//! summaries, per-attempt run results, and output chunks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::error::SchedulerResult;
use crate::domain::models::{TaskOutputChunk, TaskResultSummary, TaskRunResult, TaskStatus};
use crate::domain::ports::result_repository::ResultFilter;
use crate::domain::ports::ResultRepository;

#[derive(Clone)]
pub struct SqliteResultRepository {
    pool: SqlitePool,
}

impl SqliteResultRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    request_id: String,
    name: String,
    user: String,
    priority: i64,
    status: String,
    failure: i64,
    try_number: i64,
    bot_id: Option<String>,
    created_ts: String,
    modified_ts: String,
    started_ts: Option<String>,
    completed_ts: Option<String>,
    abandoned_ts: Option<String>,
    exit_codes: String,
}

impl SummaryRow {
    fn into_domain(self) -> SchedulerResult<TaskResultSummary> {
        let status = TaskStatus::from_str(&self.status)
            .ok_or_else(|| crate::domain::error::SchedulerError::Validation(format!("unknown status {}", self.status)))?;
        Ok(TaskResultSummary {
            request_id: parse_uuid(&self.request_id)?,
            name: self.name,
            user: self.user,
            priority: u8::try_from(self.priority).unwrap_or(255),
            status,
            failure: self.failure != 0,
            try_number: u32::try_from(self.try_number).unwrap_or(0),
            bot_id: self.bot_id,
            created_ts: parse_datetime(&self.created_ts)?,
            modified_ts: parse_datetime(&self.modified_ts)?,
            started_ts: parse_optional_datetime(self.started_ts)?,
            completed_ts: parse_optional_datetime(self.completed_ts)?,
            abandoned_ts: parse_optional_datetime(self.abandoned_ts)?,
            exit_codes: serde_json::from_str(&self.exit_codes)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RunResultRow {
    request_id: String,
    try_number: i64,
    bot_id: String,
    status: String,
    started_ts: String,
    last_update_ts: String,
    completed_ts: Option<String>,
    current_command_index: i64,
    exit_codes: String,
    output_tail_offset: i64,
}

impl RunResultRow {
    fn into_domain(self) -> SchedulerResult<TaskRunResult> {
        let status = TaskStatus::from_str(&self.status)
            .ok_or_else(|| crate::domain::error::SchedulerError::Validation(format!("unknown status {}", self.status)))?;
        Ok(TaskRunResult {
            request_id: parse_uuid(&self.request_id)?,
            try_number: u32::try_from(self.try_number).unwrap_or(0),
            bot_id: self.bot_id,
            status,
            started_ts: parse_datetime(&self.started_ts)?,
            last_update_ts: parse_datetime(&self.last_update_ts)?,
            completed_ts: parse_optional_datetime(self.completed_ts)?,
            current_command_index: usize::try_from(self.current_command_index).unwrap_or(0),
            exit_codes: serde_json::from_str(&self.exit_codes)?,
            output_tail_offset: u64::try_from(self.output_tail_offset).unwrap_or(0),
        })
    }
}

#[async_trait]
impl ResultRepository for SqliteResultRepository {
    async fn create_summary(&self, summary: &TaskResultSummary) -> SchedulerResult<()> {
        let exit_codes_json = serde_json::to_string(&summary.exit_codes)?;
        sqlx::query(
            r"INSERT INTO task_result_summaries
               (request_id, name, user, priority, status, failure, try_number, bot_id,
                created_ts, modified_ts, started_ts, completed_ts, abandoned_ts, exit_codes)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(summary.request_id.to_string())
        .bind(&summary.name)
        .bind(&summary.user)
        .bind(i64::from(summary.priority))
        .bind(summary.status.as_str())
        .bind(summary.failure)
        .bind(i64::from(summary.try_number))
        .bind(&summary.bot_id)
        .bind(summary.created_ts.to_rfc3339())
        .bind(summary.modified_ts.to_rfc3339())
        .bind(summary.started_ts.map(|ts| ts.to_rfc3339()))
        .bind(summary.completed_ts.map(|ts| ts.to_rfc3339()))
        .bind(summary.abandoned_ts.map(|ts| ts.to_rfc3339()))
        .bind(&exit_codes_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_summary(&self, request_id: Uuid) -> SchedulerResult<Option<TaskResultSummary>> {
        let row: Option<SummaryRow> = sqlx::query_as("SELECT * FROM task_result_summaries WHERE request_id = ?")
            .bind(request_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(SummaryRow::into_domain).transpose()
    }

    async fn update_summary(&self, summary: &TaskResultSummary) -> SchedulerResult<()> {
        let exit_codes_json = serde_json::to_string(&summary.exit_codes)?;
        sqlx::query(
            r"UPDATE task_result_summaries
               SET status = ?, failure = ?, try_number = ?, bot_id = ?, modified_ts = ?,
                   started_ts = ?, completed_ts = ?, abandoned_ts = ?, exit_codes = ?
               WHERE request_id = ?",
        )
        .bind(summary.status.as_str())
        .bind(summary.failure)
        .bind(i64::from(summary.try_number))
        .bind(&summary.bot_id)
        .bind(summary.modified_ts.to_rfc3339())
        .bind(summary.started_ts.map(|ts| ts.to_rfc3339()))
        .bind(summary.completed_ts.map(|ts| ts.to_rfc3339()))
        .bind(summary.abandoned_ts.map(|ts| ts.to_rfc3339()))
        .bind(&exit_codes_json)
        .bind(summary.request_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_summaries(&self, filter: ResultFilter, limit: usize) -> SchedulerResult<Vec<TaskResultSummary>> {
        let rows: Vec<SummaryRow> = if let Some(state) = filter.state {
            sqlx::query_as("SELECT * FROM task_result_summaries WHERE status = ? ORDER BY created_ts DESC LIMIT ?")
                .bind(state.as_str())
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await?
        } else if let Some(prefix) = filter.name_prefix {
            let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
            sqlx::query_as(
                r"SELECT * FROM task_result_summaries WHERE name LIKE ? ESCAPE '\' ORDER BY created_ts DESC LIMIT ?",
            )
            .bind(pattern)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as("SELECT * FROM task_result_summaries ORDER BY created_ts DESC LIMIT ?")
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await?
        };
        rows.into_iter().map(SummaryRow::into_domain).collect()
    }

    async fn create_run_result(&self, run: &TaskRunResult) -> SchedulerResult<()> {
        let exit_codes_json = serde_json::to_string(&run.exit_codes)?;
        sqlx::query(
            r"INSERT INTO task_run_results
               (request_id, try_number, bot_id, status, started_ts, last_update_ts, completed_ts,
                current_command_index, exit_codes, output_tail_offset)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run.request_id.to_string())
        .bind(i64::from(run.try_number))
        .bind(&run.bot_id)
        .bind(run.status.as_str())
        .bind(run.started_ts.to_rfc3339())
        .bind(run.last_update_ts.to_rfc3339())
        .bind(run.completed_ts.map(|ts| ts.to_rfc3339()))
        .bind(i64::try_from(run.current_command_index).unwrap_or(0))
        .bind(&exit_codes_json)
        .bind(i64::try_from(run.output_tail_offset).unwrap_or(0))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_run_result(&self, request_id: Uuid, try_number: u32) -> SchedulerResult<Option<TaskRunResult>> {
        let row: Option<RunResultRow> =
            sqlx::query_as("SELECT * FROM task_run_results WHERE request_id = ? AND try_number = ?")
                .bind(request_id.to_string())
                .bind(i64::from(try_number))
                .fetch_optional(&self.pool)
                .await?;
        row.map(RunResultRow::into_domain).transpose()
    }

    async fn update_run_result(&self, run: &TaskRunResult) -> SchedulerResult<()> {
        let exit_codes_json = serde_json::to_string(&run.exit_codes)?;
        sqlx::query(
            r"UPDATE task_run_results
               SET status = ?, last_update_ts = ?, completed_ts = ?, current_command_index = ?,
                   exit_codes = ?, output_tail_offset = ?
               WHERE request_id = ? AND try_number = ?",
        )
        .bind(run.status.as_str())
        .bind(run.last_update_ts.to_rfc3339())
        .bind(run.completed_ts.map(|ts| ts.to_rfc3339()))
        .bind(i64::try_from(run.current_command_index).unwrap_or(0))
        .bind(&exit_codes_json)
        .bind(i64::try_from(run.output_tail_offset).unwrap_or(0))
        .bind(run.request_id.to_string())
        .bind(i64::from(run.try_number))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_stale_running(&self, cutoff: DateTime<Utc>, limit: usize) -> SchedulerResult<Vec<TaskRunResult>> {
        let rows: Vec<RunResultRow> = sqlx::query_as(
            "SELECT * FROM task_run_results WHERE status = 'RUNNING' AND last_update_ts <= ? LIMIT ?",
        )
        .bind(cutoff.to_rfc3339())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RunResultRow::into_domain).collect()
    }

    async fn append_output_chunk(&self, chunk: &TaskOutputChunk) -> SchedulerResult<()> {
        sqlx::query(
            r"INSERT OR REPLACE INTO task_output_chunks (request_id, try_number, command_index, offset, data)
               VALUES (?, ?, ?, ?, ?)",
        )
        .bind(chunk.request_id.to_string())
        .bind(i64::from(chunk.try_number))
        .bind(i64::try_from(chunk.command_index).unwrap_or(0))
        .bind(i64::try_from(chunk.offset).unwrap_or(0))
        .bind(&chunk.data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_chunk(
        &self,
        request_id: Uuid,
        try_number: u32,
        command_index: usize,
        offset: u64,
    ) -> SchedulerResult<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            r"SELECT data FROM task_output_chunks
               WHERE request_id = ? AND try_number = ? AND command_index = ? AND offset = ?",
        )
        .bind(request_id.to_string())
        .bind(i64::from(try_number))
        .bind(i64::try_from(command_index).unwrap_or(0))
        .bind(i64::try_from(offset).unwrap_or(0))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(data,)| data))
    }

    async fn get_output(&self, request_id: Uuid, try_number: u32, command_index: usize) -> SchedulerResult<Vec<u8>> {
        let rows: Vec<(i64, Vec<u8>)> = sqlx::query_as(
            r"SELECT offset, data FROM task_output_chunks
               WHERE request_id = ? AND try_number = ? AND command_index = ?
               ORDER BY offset ASC",
        )
        .bind(request_id.to_string())
        .bind(i64::from(try_number))
        .bind(i64::try_from(command_index).unwrap_or(0))
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::new();
        for (_, data) in rows {
            out.extend_from_slice(&data);
        }
        Ok(out)
    }

    async fn get_all_outputs(&self, request_id: Uuid, try_number: u32) -> SchedulerResult<Vec<(usize, Vec<u8>)>> {
        let rows: Vec<(i64, i64, Vec<u8>)> = sqlx::query_as(
            r"SELECT command_index, offset, data FROM task_output_chunks
               WHERE request_id = ? AND try_number = ?
               ORDER BY command_index ASC, offset ASC",
        )
        .bind(request_id.to_string())
        .bind(i64::from(try_number))
        .fetch_all(&self.pool)
        .await?;

        let mut by_command: Vec<(usize, Vec<u8>)> = Vec::new();
        for (command_index, _offset, data) in rows {
            let command_index = usize::try_from(command_index).unwrap_or(0);
            if let Some((_, buf)) = by_command.iter_mut().find(|(idx, _)| *idx == command_index) {
                buf.extend_from_slice(&data);
            } else {
                by_command.push((command_index, data));
            }
        }
        Ok(by_command)
    }
}
