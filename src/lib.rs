//! swarmd - a distributed task reservation and dispatch service.
//!
//! Modeled on the reservation/dispatch core of a Swarming-style task
//! scheduler: bots poll for matching work, claim it atomically, stream
//! results back incrementally, and a background sweeper reclaims work
//! from tasks that expired or bots that went silent.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;
