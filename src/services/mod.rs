//! Application services: the orchestration layer between the domain
//! model and the storage/transport adapters.

pub mod cancellation;
pub mod poll_backoff;
pub mod query;
pub mod reservation;
pub mod submission;
pub mod sweeper;
pub mod update_pipeline;

#[cfg(test)]
pub mod test_support;

pub use cancellation::CancelOutcome;
pub use poll_backoff::PollBackoff;
pub use query::ListQuery;
pub use reservation::PollOutcome;
pub use submission::NewTaskRequest;
pub use sweeper::SweepReport;
pub use update_pipeline::BotUpdate;

use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::Clock;
use crate::domain::ports::{BotRepository, RequestRepository, ResultRepository, ToRunRepository, TransactionalStore};

/// Poll-protocol tuning, grouped into one struct so `SchedulerService::new`
/// doesn't grow an unwieldy run of same-typed positional parameters.
#[derive(Debug, Clone)]
pub struct PollTuning {
    /// This server's protocol version; a bot polling with a different
    /// one is told to `Update` instead of being offered work.
    pub server_version: String,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// How long a bot may run before a poll response self-initiates a
    /// `Restart` rather than dispatching more work.
    pub bot_max_lifetime: chrono::Duration,
}

impl Default for PollTuning {
    fn default() -> Self {
        Self {
            server_version: "1".to_string(),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            bot_max_lifetime: chrono::Duration::hours(24),
        }
    }
}

/// The scheduler's single application service, composed over the
/// storage ports and a clock. Constructed once at startup and cloned
/// per request (all fields are `Arc`s).
#[derive(Clone)]
pub struct SchedulerService {
    pub(crate) requests: Arc<dyn RequestRepository>,
    pub(crate) to_run: Arc<dyn ToRunRepository>,
    pub(crate) results: Arc<dyn ResultRepository>,
    pub(crate) bots: Arc<dyn BotRepository>,
    pub(crate) store: Arc<dyn TransactionalStore>,
    pub(crate) clock: Arc<dyn Clock>,
    /// Bounded candidate window scanned per poll and per sweep pass.
    pub(crate) matcher_fanout: usize,
    pub(crate) poll_tuning: PollTuning,
}

impl SchedulerService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        to_run: Arc<dyn ToRunRepository>,
        results: Arc<dyn ResultRepository>,
        bots: Arc<dyn BotRepository>,
        store: Arc<dyn TransactionalStore>,
        clock: Arc<dyn Clock>,
        matcher_fanout: usize,
        poll_tuning: PollTuning,
    ) -> Self {
        Self { requests, to_run, results, bots, store, clock, matcher_fanout, poll_tuning }
    }
}
