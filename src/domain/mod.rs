//! Domain layer for the scheduler.
//!
//! This module contains core business logic and domain models. It has
//! no dependency on any transport or storage crate beyond `sqlx::Error`
//! and `serde_json::Error` for error conversion.

pub mod error;
pub mod models;
pub mod ports;

pub use error::{SchedulerError, SchedulerResult};
