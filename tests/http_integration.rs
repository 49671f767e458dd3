//! End-to-end tests through the real HTTP surface: submit, poll, stream
//! output, complete, and cancel, each driven by an actual client against
//! a bound `axum` server rather than calling the service layer directly.

use std::sync::Arc;

use base64::Engine;
use serde_json::{json, Value};
use swarmd::adapters::http::{SchedulerHttpConfig, SchedulerHttpServer};
use swarmd::adapters::sqlite::{
    create_migrated_test_pool, SqliteBotRepository, SqliteRequestRepository, SqliteResultRepository,
    SqliteToRunRepository, SqliteTransactionalStore,
};
use swarmd::domain::models::SystemClock;
use swarmd::services::{PollTuning, SchedulerService};
use tokio::net::TcpListener;

/// Boots a scheduler against an in-memory database on an ephemeral port
/// and hands back a base URL for the test to drive with `reqwest`.
async fn spawn_server() -> String {
    let pool = create_migrated_test_pool().await.expect("migrated test pool");
    let service = SchedulerService::new(
        Arc::new(SqliteRequestRepository::new(pool.clone())),
        Arc::new(SqliteToRunRepository::new(pool.clone())),
        Arc::new(SqliteResultRepository::new(pool.clone())),
        Arc::new(SqliteBotRepository::new(pool.clone())),
        Arc::new(SqliteTransactionalStore::new(pool)),
        Arc::new(SystemClock),
        50,
        PollTuning::default(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    let server = SchedulerHttpServer::new(service, SchedulerHttpConfig { host: addr.ip().to_string(), port: addr.port(), enable_cors: false });
    tokio::spawn(async move {
        let _ = server.serve_on(listener).await;
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn full_task_lifecycle_through_http() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let submit: Value = client
        .post(format!("{base}/api/v1/tasks"))
        .json(&json!({
            "name": "build",
            "commands": [["echo", "hi"]],
            "dimensions": {"os": "linux"},
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let task_id = submit["task_id"].as_str().unwrap().to_string();

    let summary: Value = client.get(format!("{base}/api/v1/tasks/{task_id}")).send().await.unwrap().json().await.unwrap();
    assert_eq!(summary["status"], "PENDING");
    assert_eq!(summary["task_id"], task_id);

    let mut bot_dims = std::collections::BTreeMap::new();
    bot_dims.insert("os".to_string(), vec!["linux".to_string()]);
    let poll: Value = client
        .post(format!("{base}/api/v1/bot/poll"))
        .json(&json!({"bot_id": "bot-1", "version": "1", "dimensions": bot_dims}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(poll["outcome"], "run");
    let run_task_id = poll["task_id"].as_str().unwrap().to_string();
    assert_ne!(run_task_id, task_id, "run-result id and summary id for the same request are packed differently");
    let try_number = poll["try_number"].as_u64().unwrap();

    let output_b64 = base64::engine::general_purpose::STANDARD.encode(b"hi\n");
    let update = client
        .post(format!("{base}/api/v1/bot/update/{run_task_id}"))
        .json(&json!({
            "try_number": try_number,
            "bot_id": "bot-1",
            "command_index": 0,
            "output_offset": 0,
            "output_base64": output_b64,
            "exit_code": 0,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(update.status(), 204);

    let summary: Value = client.get(format!("{base}/api/v1/tasks/{task_id}")).send().await.unwrap().json().await.unwrap();
    assert_eq!(summary["status"], "COMPLETED");
    assert_eq!(summary["failure"], false);

    let output: Value = client
        .get(format!("{base}/api/v1/tasks/{task_id}/output/{try_number}/0"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let decoded = base64::engine::general_purpose::STANDARD.decode(output.as_str().unwrap()).unwrap();
    assert_eq!(decoded, b"hi\n");
}

#[tokio::test]
async fn unmatched_dimensions_yield_sleep_and_pending_stays_uncancellable_after_terminal() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let submit: Value = client
        .post(format!("{base}/api/v1/tasks"))
        .json(&json!({"name": "gpu-job", "commands": [["render"]], "dimensions": {"gpu": "nvidia"}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let task_id = submit["task_id"].as_str().unwrap().to_string();

    let poll: Value = client
        .post(format!("{base}/api/v1/bot/poll"))
        .json(&json!({"bot_id": "bot-cpu", "version": "1", "dimensions": {}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(poll["outcome"], "sleep");

    let cancel: Value = client.post(format!("{base}/api/v1/tasks/{task_id}/cancel")).send().await.unwrap().json().await.unwrap();
    assert_eq!(cancel["ok"], true);

    let cancel_again: Value = client.post(format!("{base}/api/v1/tasks/{task_id}/cancel")).send().await.unwrap().json().await.unwrap();
    assert_eq!(cancel_again["ok"], false);
}

#[tokio::test]
async fn two_bots_polling_the_same_task_only_one_wins() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let submit: Value = client
        .post(format!("{base}/api/v1/tasks"))
        .json(&json!({"name": "race", "commands": [["true"]]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(submit["task_id"].as_str().is_some());

    let poll_a =
        client.post(format!("{base}/api/v1/bot/poll")).json(&json!({"bot_id": "bot-a", "version": "1", "dimensions": {}})).send();
    let poll_b =
        client.post(format!("{base}/api/v1/bot/poll")).json(&json!({"bot_id": "bot-b", "version": "1", "dimensions": {}})).send();
    let (a, b) = tokio::join!(poll_a, poll_b);
    let a: Value = a.unwrap().json().await.unwrap();
    let b: Value = b.unwrap().json().await.unwrap();

    let outcomes: Vec<&str> = vec![a["outcome"].as_str().unwrap(), b["outcome"].as_str().unwrap()];
    assert_eq!(outcomes.iter().filter(|o| **o == "run").count(), 1, "exactly one bot claims the task");
}

#[tokio::test]
async fn bot_polling_with_a_stale_protocol_version_is_told_to_update() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let poll: Value = client
        .post(format!("{base}/api/v1/bot/poll"))
        .json(&json!({"bot_id": "bot-old", "version": "0", "dimensions": {}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(poll["outcome"], "update");
}
