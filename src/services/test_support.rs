//! Shared fixture for service-layer tests: an in-memory sqlite-backed
//! `SchedulerService` wired to a `TestClock` the test can advance.

use std::sync::Arc;

use chrono::Utc;

use crate::adapters::sqlite::{
    create_migrated_test_pool, SqliteBotRepository, SqliteRequestRepository, SqliteResultRepository,
    SqliteToRunRepository, SqliteTransactionalStore,
};
use crate::domain::models::TestClock;

use super::{PollTuning, SchedulerService};

pub async fn in_memory_service() -> (SchedulerService, TestClock) {
    let pool = create_migrated_test_pool().await.expect("migrated test pool");
    let clock = TestClock::new(Utc::now());

    let service = SchedulerService::new(
        Arc::new(SqliteRequestRepository::new(pool.clone())),
        Arc::new(SqliteToRunRepository::new(pool.clone())),
        Arc::new(SqliteResultRepository::new(pool.clone())),
        Arc::new(SqliteBotRepository::new(pool.clone())),
        Arc::new(SqliteTransactionalStore::new(pool)),
        Arc::new(clock.clone()),
        50,
        PollTuning::default(),
    );

    (service, clock)
}
