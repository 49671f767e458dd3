//! SQLite implementation of the `TransactionalStore` port.
//!
//! Mirrors the teacher's `submit_tasks_transactional`-style pattern:
//! `pool.begin()`, a handful of statements against the open transaction,
//! `tx.commit()`. Statements here duplicate the single-row SQL already
//! written in `request_repository`/`to_run_repository`/`result_repository`
//! rather than calling back into those ports, since a port method takes
//! `&SqlitePool` and can't be handed a transaction without widening
//! every other port's signature for the sake of these four call sites.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::error::SchedulerResult;
use crate::domain::models::{TaskOutputChunk, TaskRequest, TaskResultSummary, TaskRunResult, TaskToRun};
use crate::domain::ports::TransactionalStore;

#[derive(Clone)]
pub struct SqliteTransactionalStore {
    pool: SqlitePool,
}

impl SqliteTransactionalStore {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionalStore for SqliteTransactionalStore {
    async fn submit_task(
        &self,
        request: &TaskRequest,
        to_run: &TaskToRun,
        summary: &TaskResultSummary,
    ) -> SchedulerResult<()> {
        let commands_json = serde_json::to_string(&request.commands)?;
        let dimensions_json = serde_json::to_string(&request.dimensions)?;
        let exit_codes_json = serde_json::to_string(&summary.exit_codes)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"INSERT INTO task_requests
               (id, name, commands, dimensions, priority, properties_hash, dimensions_hash,
                created_ts, expiration_ts, execution_timeout_secs, created_by)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(request.id.to_string())
        .bind(&request.name)
        .bind(&commands_json)
        .bind(&dimensions_json)
        .bind(i64::from(request.priority))
        .bind(&request.properties_hash)
        .bind(&request.dimensions_hash)
        .bind(request.created_ts.to_rfc3339())
        .bind(request.expiration_ts.to_rfc3339())
        .bind(request.execution_timeout.num_seconds())
        .bind(&request.created_by)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"INSERT INTO tasks_to_run (request_id, try_number, queue_number, expiration_ts, reaped_ts, reaped_by)
               VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(to_run.request_id.to_string())
        .bind(i64::from(to_run.try_number))
        .bind(to_run.queue_number)
        .bind(to_run.expiration_ts.to_rfc3339())
        .bind(to_run.reaped_ts.map(|ts| ts.to_rfc3339()))
        .bind(&to_run.reaped_by)
        .execute(&mut *tx)
        .await?;

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
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn claim_and_start(
        &self,
        request_id: Uuid,
        bot_id: &str,
        now: DateTime<Utc>,
        run: &TaskRunResult,
        summary: &TaskResultSummary,
    ) -> SchedulerResult<bool> {
        let mut tx = self.pool.begin().await?;

        let claim = sqlx::query(
            r"UPDATE tasks_to_run SET reaped_ts = ?, reaped_by = ?
               WHERE request_id = ? AND reaped_ts IS NULL AND expiration_ts > ?",
        )
        .bind(now.to_rfc3339())
        .bind(bot_id)
        .bind(request_id.to_string())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if claim.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

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
        .execute(&mut *tx)
        .await?;

        let summary_exit_codes_json = serde_json::to_string(&summary.exit_codes)?;
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
        .bind(&summary_exit_codes_json)
        .bind(summary.request_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn apply_bot_update(
        &self,
        run: &TaskRunResult,
        summary: &TaskResultSummary,
        chunk: Option<&TaskOutputChunk>,
        finished: bool,
    ) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(chunk) = chunk {
            sqlx::query(
                r"INSERT INTO task_output_chunks (request_id, try_number, command_index, offset, data)
                   VALUES (?, ?, ?, ?, ?)",
            )
            .bind(chunk.request_id.to_string())
            .bind(i64::from(chunk.try_number))
            .bind(i64::try_from(chunk.command_index).unwrap_or(0))
            .bind(i64::try_from(chunk.offset).unwrap_or(0))
            .bind(&chunk.data)
            .execute(&mut *tx)
            .await?;
        }

        let run_exit_codes_json = serde_json::to_string(&run.exit_codes)?;
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
        .bind(&run_exit_codes_json)
        .bind(i64::try_from(run.output_tail_offset).unwrap_or(0))
        .bind(run.request_id.to_string())
        .bind(i64::from(run.try_number))
        .execute(&mut *tx)
        .await?;

        let summary_exit_codes_json = serde_json::to_string(&summary.exit_codes)?;
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
        .bind(&summary_exit_codes_json)
        .bind(summary.request_id.to_string())
        .execute(&mut *tx)
        .await?;

        if finished {
            sqlx::query("UPDATE tasks_to_run SET reaped_ts = ? WHERE request_id = ? AND reaped_ts IS NULL")
                .bind(run.last_update_ts.to_rfc3339())
                .bind(run.request_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn cancel(
        &self,
        summary: &TaskResultSummary,
        run: Option<&TaskRunResult>,
        now: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;

        let exit_codes_json = serde_json::to_string(&summary.exit_codes)?;
        sqlx::query(
            r"UPDATE task_result_summaries
               SET status = ?, failure = ?, modified_ts = ?, completed_ts = ?, abandoned_ts = ?, exit_codes = ?
               WHERE request_id = ?",
        )
        .bind(summary.status.as_str())
        .bind(summary.failure)
        .bind(summary.modified_ts.to_rfc3339())
        .bind(summary.completed_ts.map(|ts| ts.to_rfc3339()))
        .bind(summary.abandoned_ts.map(|ts| ts.to_rfc3339()))
        .bind(&exit_codes_json)
        .bind(summary.request_id.to_string())
        .execute(&mut *tx)
        .await?;

        if let Some(run) = run {
            let run_exit_codes_json = serde_json::to_string(&run.exit_codes)?;
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
            .bind(&run_exit_codes_json)
            .bind(i64::try_from(run.output_tail_offset).unwrap_or(0))
            .bind(run.request_id.to_string())
            .bind(i64::from(run.try_number))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE tasks_to_run SET reaped_ts = ? WHERE request_id = ? AND reaped_ts IS NULL")
            .bind(now.to_rfc3339())
            .bind(summary.request_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
