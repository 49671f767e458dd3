//! HTTP adapters: the client-facing and bot-facing REST surface.

pub mod error;
pub mod tasks;

pub use tasks::{SchedulerHttpConfig, SchedulerHttpServer};
