//! Infrastructure layer
//!
//! Ambient concerns that aren't part of the domain: configuration
//! loading and structured logging setup.

pub mod config;
pub mod logging;
