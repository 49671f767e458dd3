//! Domain models
//!
//! Pure domain entities with business logic and validation rules.
//! These models are framework-agnostic and contain no infrastructure concerns.

pub mod clock;
pub mod config;
pub mod dimensions;
pub mod identity;
pub mod ids;
pub mod task;

pub use clock::{Clock, SystemClock, TestClock};
pub use config::Config;
pub use dimensions::{
    bot_dimensions_powerset_size, dimensions_hash, matches, properties_hash, queue_number, validate_bot_dimensions,
    validate_task_dimensions, BotDimensions, DimensionsError, TaskDimensions, MAX_BOT_DIMENSION_POWERSET,
    MAX_DIMENSIONS,
};
pub use identity::{Identity, StaticIdentity};
pub use ids::{TaskId, TaskIdError, TaskIdKind};
pub use task::{
    TaskOutputChunk, TaskRequest, TaskResultSummary, TaskRunResult, TaskStatus, TaskToRun,
    OUTPUT_CHUNK_SIZE,
};
