//! SQLite implementation of the `ToRunRepository` port.
//!
//! The claim is a single-row CAS: `UPDATE ... WHERE reaped_ts IS NULL`
//! and check `rows_affected()`, mirroring the reservation pattern used
//! throughout this adapter set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::error::SchedulerResult;
use crate::domain::models::TaskToRun;
use crate::domain::ports::to_run_repository::Candidate;
use crate::domain::ports::ToRunRepository;

#[derive(Clone)]
pub struct SqliteToRunRepository {
    pool: SqlitePool,
}

impl SqliteToRunRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ToRunRow {
    request_id: String,
    try_number: i64,
    queue_number: i64,
    expiration_ts: String,
    reaped_ts: Option<String>,
    reaped_by: Option<String>,
}

impl ToRunRow {
    fn into_domain(self) -> SchedulerResult<TaskToRun> {
        Ok(TaskToRun {
            request_id: parse_uuid(&self.request_id)?,
            try_number: u32::try_from(self.try_number).unwrap_or(0),
            queue_number: self.queue_number,
            expiration_ts: parse_datetime(&self.expiration_ts)?,
            reaped_ts: parse_optional_datetime(self.reaped_ts)?,
            reaped_by: self.reaped_by,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CandidateRow {
    request_id: String,
    try_number: i64,
    queue_number: i64,
    expiration_ts: String,
    reaped_ts: Option<String>,
    reaped_by: Option<String>,
    dimensions: String,
}

impl CandidateRow {
    fn into_domain(self) -> SchedulerResult<Candidate> {
        let to_run = ToRunRow {
            request_id: self.request_id,
            try_number: self.try_number,
            queue_number: self.queue_number,
            expiration_ts: self.expiration_ts,
            reaped_ts: self.reaped_ts,
            reaped_by: self.reaped_by,
        }
        .into_domain()?;
        Ok(Candidate { to_run, dimensions: serde_json::from_str(&self.dimensions)? })
    }
}

#[async_trait]
impl ToRunRepository for SqliteToRunRepository {
    async fn create(&self, to_run: &TaskToRun) -> SchedulerResult<()> {
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
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_candidates(&self, limit: usize) -> SchedulerResult<Vec<Candidate>> {
        let rows: Vec<CandidateRow> = sqlx::query_as(
            r"SELECT t.request_id, t.try_number, t.queue_number, t.expiration_ts, t.reaped_ts, t.reaped_by,
                      r.dimensions
               FROM tasks_to_run t JOIN task_requests r ON r.id = t.request_id
               WHERE t.reaped_ts IS NULL
               ORDER BY t.queue_number ASC, t.request_id ASC
               LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CandidateRow::into_domain).collect()
    }

    async fn claim(&self, request_id: Uuid, bot_id: &str, now: DateTime<Utc>) -> SchedulerResult<Option<TaskToRun>> {
        let result = sqlx::query(
            r"UPDATE tasks_to_run SET reaped_ts = ?, reaped_by = ?
               WHERE request_id = ? AND reaped_ts IS NULL AND expiration_ts > ?",
        )
        .bind(now.to_rfc3339())
        .bind(bot_id)
        .bind(request_id.to_string())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(request_id).await
    }

    async fn get(&self, request_id: Uuid) -> SchedulerResult<Option<TaskToRun>> {
        let row: Option<ToRunRow> = sqlx::query_as("SELECT * FROM tasks_to_run WHERE request_id = ?")
            .bind(request_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(ToRunRow::into_domain).transpose()
    }

    async fn delete(&self, request_id: Uuid) -> SchedulerResult<()> {
        sqlx::query("DELETE FROM tasks_to_run WHERE request_id = ?")
            .bind(request_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn abort(&self, request_id: Uuid, now: DateTime<Utc>) -> SchedulerResult<()> {
        sqlx::query("UPDATE tasks_to_run SET reaped_ts = ? WHERE request_id = ? AND reaped_ts IS NULL")
            .bind(now.to_rfc3339())
            .bind(request_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_expired(&self, now: DateTime<Utc>, limit: usize) -> SchedulerResult<Vec<TaskToRun>> {
        let rows: Vec<ToRunRow> = sqlx::query_as(
            "SELECT * FROM tasks_to_run WHERE reaped_ts IS NULL AND expiration_ts <= ? LIMIT ?",
        )
        .bind(now.to_rfc3339())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ToRunRow::into_domain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{dimensions_hash, properties_hash, TaskDimensions, TaskRequest};
    use crate::domain::ports::RequestRepository;
    use chrono::Duration;

    async fn seed_request(pool: &SqlitePool) -> TaskRequest {
        let mut dims = TaskDimensions::new();
        dims.insert("pool".to_string(), "default".to_string());
        let commands = vec![vec!["true".to_string()]];
        let now = Utc::now();
        let request = TaskRequest {
            id: Uuid::new_v4(),
            name: "t".to_string(),
            properties_hash: properties_hash(&dims, &commands),
            dimensions_hash: dimensions_hash(&dims),
            commands,
            dimensions: dims,
            priority: 100,
            created_ts: now,
            expiration_ts: now + Duration::minutes(5),
            execution_timeout: Duration::minutes(10),
            created_by: "alice".to_string(),
        };
        crate::adapters::sqlite::request_repository::SqliteRequestRepository::new(pool.clone())
            .create(&request)
            .await
            .unwrap();
        request
    }

    #[tokio::test]
    async fn claim_succeeds_once_and_fails_on_retry() {
        let pool = create_migrated_test_pool().await.unwrap();
        let request = seed_request(&pool).await;
        let repo = SqliteToRunRepository::new(pool);
        let now = Utc::now();
        let to_run = TaskToRun {
            request_id: request.id,
            try_number: 1,
            queue_number: 0,
            expiration_ts: now + Duration::minutes(5),
            reaped_ts: None,
            reaped_by: None,
        };
        repo.create(&to_run).await.unwrap();

        let first = repo.claim(request.id, "bot-1", now).await.unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().reaped_by.as_deref(), Some("bot-1"));

        let second = repo.claim(request.id, "bot-2", now).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn claim_fails_past_expiration() {
        let pool = create_migrated_test_pool().await.unwrap();
        let request = seed_request(&pool).await;
        let repo = SqliteToRunRepository::new(pool);
        let now = Utc::now();
        let to_run = TaskToRun {
            request_id: request.id,
            try_number: 1,
            queue_number: 0,
            expiration_ts: now - Duration::seconds(1),
            reaped_ts: None,
            reaped_by: None,
        };
        repo.create(&to_run).await.unwrap();

        assert!(repo.claim(request.id, "bot-1", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_candidates_orders_by_queue_number() {
        let pool = create_migrated_test_pool().await.unwrap();
        let low = seed_request(&pool).await;
        let high = seed_request(&pool).await;
        let repo = SqliteToRunRepository::new(pool);
        let now = Utc::now();
        let expiration = now + Duration::minutes(5);
        repo.create(&TaskToRun {
            request_id: low.id,
            try_number: 1,
            queue_number: 100,
            expiration_ts: expiration,
            reaped_ts: None,
            reaped_by: None,
        })
        .await
        .unwrap();
        repo.create(&TaskToRun {
            request_id: high.id,
            try_number: 1,
            queue_number: 10,
            expiration_ts: expiration,
            reaped_ts: None,
            reaped_by: None,
        })
        .await
        .unwrap();

        let candidates = repo.list_candidates(10).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].to_run.request_id, high.id);
    }

    #[tokio::test]
    async fn abort_reaps_without_setting_reaped_by() {
        let pool = create_migrated_test_pool().await.unwrap();
        let request = seed_request(&pool).await;
        let repo = SqliteToRunRepository::new(pool);
        let now = Utc::now();
        repo.create(&TaskToRun {
            request_id: request.id,
            try_number: 1,
            queue_number: 0,
            expiration_ts: now + Duration::minutes(5),
            reaped_ts: None,
            reaped_by: None,
        })
        .await
        .unwrap();

        repo.abort(request.id, now).await.unwrap();

        let row = repo.get(request.id).await.unwrap().unwrap();
        assert_eq!(row.reaped_ts, Some(now));
        assert!(row.reaped_by.is_none());
    }

    #[tokio::test]
    async fn abort_is_idempotent_and_never_overwrites_a_claim() {
        let pool = create_migrated_test_pool().await.unwrap();
        let request = seed_request(&pool).await;
        let repo = SqliteToRunRepository::new(pool);
        let now = Utc::now();
        repo.create(&TaskToRun {
            request_id: request.id,
            try_number: 1,
            queue_number: 0,
            expiration_ts: now + Duration::minutes(5),
            reaped_ts: None,
            reaped_by: None,
        })
        .await
        .unwrap();

        repo.claim(request.id, "bot-1", now).await.unwrap();
        let later = now + Duration::seconds(5);
        repo.abort(request.id, later).await.unwrap();

        let row = repo.get(request.id).await.unwrap().unwrap();
        assert_eq!(row.reaped_ts, Some(now));
        assert_eq!(row.reaped_by.as_deref(), Some("bot-1"));
    }
}
