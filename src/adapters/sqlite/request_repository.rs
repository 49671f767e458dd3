//! SQLite implementation of the `RequestRepository` port.

use async_trait::async_trait;
use chrono::Duration;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_uuid};
use crate::domain::error::SchedulerResult;
use crate::domain::models::TaskRequest;
use crate::domain::ports::RequestRepository;

#[derive(Clone)]
pub struct SqliteRequestRepository {
    pool: SqlitePool,
}

impl SqliteRequestRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: String,
    name: String,
    commands: String,
    dimensions: String,
    priority: i64,
    properties_hash: String,
    dimensions_hash: String,
    created_ts: String,
    expiration_ts: String,
    execution_timeout_secs: i64,
    created_by: String,
}

impl RequestRow {
    fn into_domain(self) -> SchedulerResult<TaskRequest> {
        Ok(TaskRequest {
            id: parse_uuid(&self.id)?,
            name: self.name,
            commands: serde_json::from_str(&self.commands)?,
            dimensions: serde_json::from_str(&self.dimensions)?,
            priority: u8::try_from(self.priority).unwrap_or(255),
            properties_hash: self.properties_hash,
            dimensions_hash: self.dimensions_hash,
            created_ts: parse_datetime(&self.created_ts)?,
            expiration_ts: parse_datetime(&self.expiration_ts)?,
            execution_timeout: Duration::seconds(self.execution_timeout_secs),
            created_by: self.created_by,
        })
    }
}

#[async_trait]
impl RequestRepository for SqliteRequestRepository {
    async fn create(&self, request: &TaskRequest) -> SchedulerResult<()> {
        let commands_json = serde_json::to_string(&request.commands)?;
        let dimensions_json = serde_json::to_string(&request.dimensions)?;

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
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> SchedulerResult<Option<TaskRequest>> {
        let row: Option<RequestRow> = sqlx::query_as("SELECT * FROM task_requests WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(RequestRow::into_domain).transpose()
    }

    async fn list_by_creator(&self, created_by: &str, limit: usize) -> SchedulerResult<Vec<TaskRequest>> {
        let rows: Vec<RequestRow> = sqlx::query_as(
            "SELECT * FROM task_requests WHERE created_by = ? ORDER BY created_ts DESC LIMIT ?",
        )
        .bind(created_by)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RequestRow::into_domain).collect()
    }
}
