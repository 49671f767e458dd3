//! Periodic sweep: expires un-reaped `TaskToRun` rows past their
//! expiration, and declares `BOT_DIED` for runs whose bot has gone
//! silent past the bot-death timeout. Both passes are idempotent.

use crate::domain::error::SchedulerResult;
use crate::domain::models::TaskStatus;

use super::SchedulerService;

/// Counts from one sweep pass, for logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub expired: usize,
    pub bot_died: usize,
}

impl SchedulerService {
    /// Run one sweep pass: expire overdue pending tasks, then declare
    /// `BOT_DIED` for runs that have gone quiet.
    pub async fn sweep(&self, bot_death_timeout: chrono::Duration) -> SchedulerResult<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        let expired = self.to_run.list_expired(now, self.matcher_fanout).await?;
        for to_run in expired {
            self.to_run.abort(to_run.request_id, now).await?;
            if let Some(mut summary) = self.results.get_summary(to_run.request_id).await? {
                if summary.transition_to(TaskStatus::Expired, now).is_ok() {
                    self.results.update_summary(&summary).await?;
                    report.expired += 1;
                }
            }
        }

        let cutoff = now - bot_death_timeout;
        let stale = self.results.list_stale_running(cutoff, self.matcher_fanout).await?;
        for mut run in stale {
            run.status = TaskStatus::BotDied;
            run.completed_ts = Some(now);
            run.last_update_ts = now;
            self.results.update_run_result(&run).await?;

            if let Some(mut summary) = self.results.get_summary(run.request_id).await? {
                if summary.transition_to(TaskStatus::BotDied, now).is_ok() {
                    self.results.update_summary(&summary).await?;
                    report.bot_died += 1;
                }
            }
        }

        Ok(report)
    }
}
