//! Scheduler HTTP server: client-facing task submission/query/cancel
//! endpoints and the bot-facing poll/update protocol.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::domain::error::SchedulerError;
use crate::domain::models::{
    BotDimensions, StaticIdentity, TaskDimensions, TaskId, TaskIdKind, TaskResultSummary, TaskStatus,
};
use crate::services::{BotUpdate, ListQuery, NewTaskRequest, PollOutcome, SchedulerService};

use super::error::HttpError;

#[derive(Debug, Clone)]
pub struct SchedulerHttpConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for SchedulerHttpConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8070, enable_cors: true }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    pub name: String,
    pub commands: Vec<Vec<String>>,
    #[serde(default)]
    pub dimensions: TaskDimensions,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: i64,
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: i64,
}

const fn default_priority() -> u8 {
    100
}

const fn default_expiration_secs() -> i64 {
    300
}

const fn default_execution_timeout_secs() -> i64 {
    3600
}

#[derive(Debug, Serialize)]
pub struct SubmitTaskResponse {
    pub task_id: String,
}

/// Client-facing view of a `TaskResultSummary`: the internal `request_id`
/// is replaced by the packed, kind-tagged `task_id` clients round-trip
/// back through `/tasks/{task_id}` and `/tasks/{task_id}/cancel`.
#[derive(Debug, Serialize)]
pub struct TaskSummaryResponse {
    pub task_id: String,
    pub name: String,
    pub user: String,
    pub priority: u8,
    pub status: TaskStatus,
    pub failure: bool,
    pub try_number: u32,
    pub bot_id: Option<String>,
    pub created_ts: DateTime<Utc>,
    pub modified_ts: DateTime<Utc>,
    pub started_ts: Option<DateTime<Utc>>,
    pub completed_ts: Option<DateTime<Utc>>,
    pub abandoned_ts: Option<DateTime<Utc>>,
    pub exit_codes: Vec<Option<i32>>,
}

impl From<TaskResultSummary> for TaskSummaryResponse {
    fn from(summary: TaskResultSummary) -> Self {
        Self {
            task_id: TaskId::summary(summary.request_id).encode(),
            name: summary.name,
            user: summary.user,
            priority: summary.priority,
            status: summary.status,
            failure: summary.failure,
            try_number: summary.try_number,
            bot_id: summary.bot_id,
            created_ts: summary.created_ts,
            modified_ts: summary.modified_ts,
            started_ts: summary.started_ts,
            completed_ts: summary.completed_ts,
            abandoned_ts: summary.abandoned_ts,
            exit_codes: summary.exit_codes,
        }
    }
}

/// Parse a packed task id out of a path segment, rejecting one of the
/// wrong kind so a run-result id can't be used where a summary id is
/// expected, or vice versa.
fn parse_task_id(raw: &str, expected: TaskIdKind) -> Result<Uuid, HttpError> {
    let id = TaskId::decode(raw).map_err(|e| SchedulerError::Validation(e.to_string()))?;
    if id.kind != expected {
        return Err(HttpError(SchedulerError::Validation(format!(
            "task id {raw} is not a {expected:?} id"
        ))));
    }
    Ok(id.request_id)
}

#[derive(Debug, Deserialize)]
pub struct PollRequest {
    pub bot_id: String,
    pub version: String,
    #[serde(default)]
    pub dimensions: BotDimensions,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollResponse {
    Run { task_id: String, try_number: u32, commands: Vec<Vec<String>> },
    Sleep { duration_secs: u64 },
    Update { server_version: String },
    Restart { message: String },
    Terminate { task_id: String },
}

impl From<PollOutcome> for PollResponse {
    fn from(outcome: PollOutcome) -> Self {
        match outcome {
            PollOutcome::Run { request_id, try_number, commands } => {
                Self::Run { task_id: TaskId::run_result(request_id).encode(), try_number, commands }
            }
            PollOutcome::Sleep { duration_secs } => Self::Sleep { duration_secs },
            PollOutcome::Update { server_version } => Self::Update { server_version },
            PollOutcome::Restart { message } => Self::Restart { message },
            PollOutcome::Terminate { request_id } => {
                Self::Terminate { task_id: TaskId::summary(request_id).encode() }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub try_number: u32,
    pub bot_id: String,
    pub command_index: usize,
    #[serde(default)]
    pub output_offset: u64,
    /// Base64-encoded output bytes for this increment.
    #[serde(default)]
    pub output_base64: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListTasksQuery {
    pub name_prefix: Option<String>,
    pub state: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

const fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub ok: bool,
    pub was_running: bool,
}

struct AppState {
    service: SchedulerService,
}

pub struct SchedulerHttpServer {
    config: SchedulerHttpConfig,
    service: SchedulerService,
}

impl SchedulerHttpServer {
    pub const fn new(service: SchedulerService, config: SchedulerHttpConfig) -> Self {
        Self { config, service }
    }

    fn build_router(self) -> Router {
        let state = Arc::new(AppState { service: self.service });

        let app = Router::new()
            .route("/api/v1/tasks", post(submit_task))
            .route("/api/v1/tasks", get(list_tasks))
            .route("/api/v1/tasks/{task_id}", get(get_task))
            .route("/api/v1/tasks/{task_id}/cancel", post(cancel_task))
            .route("/api/v1/tasks/{task_id}/output/{try_number}/{command_index}", get(get_output))
            .route("/api/v1/bot/poll", post(bot_poll))
            .route("/api/v1/bot/update/{task_id}", post(bot_update))
            .route("/health", get(health_check))
            .with_state(state);

        if self.config.enable_cors {
            app.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
                .layer(TraceLayer::new_for_http())
        } else {
            app.layer(TraceLayer::new_for_http())
        }
    }

    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener. Lets callers bind to port 0
    /// and read back the assigned port before the router takes over.
    pub async fn serve_on(self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let router = self.build_router();
        tracing::info!(addr = %listener.local_addr()?, "scheduler HTTP server listening");
        axum::serve(listener, router).await?;
        Ok(())
    }

    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let router = self.build_router();
        tracing::info!(%addr, "scheduler HTTP server listening");
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;
        Ok(())
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitTaskRequest>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), HttpError> {
    // Anonymous, unprivileged: production deployments sit this behind an
    // auth layer that resolves the caller's identity before this point.
    let identity = StaticIdentity::anonymous();
    let request = state
        .service
        .make_request(
            &identity,
            NewTaskRequest {
                name: req.name,
                commands: req.commands,
                dimensions: req.dimensions,
                priority: req.priority,
                expiration: chrono::Duration::seconds(req.expiration_secs),
                execution_timeout: chrono::Duration::seconds(req.execution_timeout_secs),
            },
        )
        .await?;
    let task_id = TaskId::summary(request.id).encode();
    Ok((StatusCode::CREATED, Json(SubmitTaskResponse { task_id })))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskSummaryResponse>, HttpError> {
    let request_id = parse_task_id(&task_id, TaskIdKind::Summary)?;
    match state.service.get_result_summary(request_id).await? {
        Some(summary) => Ok(Json(summary.into())),
        None => Err(HttpError(SchedulerError::NotFound(format!("task {task_id}")))),
    }
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTasksQuery>,
) -> Result<Json<Vec<TaskSummaryResponse>>, HttpError> {
    let state_filter = params.state.as_deref().and_then(TaskStatus::from_str);
    let results = state
        .service
        .list_results(ListQuery { name_prefix: params.name_prefix, state: state_filter }, params.limit)
        .await?;
    Ok(Json(results.into_iter().map(TaskSummaryResponse::from).collect()))
}

async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<CancelResponse>, HttpError> {
    let request_id = parse_task_id(&task_id, TaskIdKind::Summary)?;
    let outcome = state.service.cancel_task(request_id).await?;
    Ok(Json(CancelResponse { ok: outcome.ok, was_running: outcome.was_running }))
}

async fn get_output(
    State(state): State<Arc<AppState>>,
    Path((task_id, try_number, command_index)): Path<(String, u32, usize)>,
) -> Result<Json<String>, HttpError> {
    let request_id = parse_task_id(&task_id, TaskIdKind::Summary)?;
    let bytes = state.service.get_output(request_id, try_number, command_index).await?;
    Ok(Json(base64::engine::general_purpose::STANDARD.encode(bytes)))
}

async fn bot_poll(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PollRequest>,
) -> Result<Json<PollResponse>, HttpError> {
    let outcome = state.service.poll(&req.bot_id, &req.version, &req.dimensions).await?;
    Ok(Json(outcome.into()))
}

async fn bot_update(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<StatusCode, HttpError> {
    let request_id = parse_task_id(&task_id, TaskIdKind::RunResult)?;
    let output = base64::engine::general_purpose::STANDARD
        .decode(req.output_base64.as_bytes())
        .map_err(|e| SchedulerError::Validation(format!("invalid base64 output: {e}")))?;

    state
        .service
        .bot_update_task(BotUpdate {
            request_id,
            try_number: req.try_number,
            bot_id: req.bot_id,
            command_index: req.command_index,
            output_offset: req.output_offset,
            output,
            exit_code: req.exit_code,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_has_sane_port() {
        let config = SchedulerHttpConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8070);
        assert!(config.enable_cors);
    }

    #[test]
    fn submit_request_deserializes_with_defaults() {
        let json = r#"{"name": "build", "commands": [["echo", "hi"]]}"#;
        let req: SubmitTaskRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.name, "build");
        assert_eq!(req.priority, 100);
        assert_eq!(req.expiration_secs, 300);
    }

    #[test]
    fn poll_response_serializes_run_variant() {
        let response =
            PollResponse::Run { task_id: TaskId::run_result(Uuid::nil()).encode(), try_number: 1, commands: vec![] };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"outcome\":\"run\""));
    }

    #[test]
    fn parse_task_id_rejects_the_wrong_kind() {
        let summary_id = TaskId::summary(Uuid::new_v4()).encode();
        let err = parse_task_id(&summary_id, TaskIdKind::RunResult);
        assert!(err.is_err());
    }

    #[test]
    fn parse_task_id_rejects_garbage() {
        assert!(parse_task_id("not-a-task-id", TaskIdKind::Summary).is_err());
    }
}
