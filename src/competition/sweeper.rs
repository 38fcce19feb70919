// Deadline sweeper: opens scheduled voting windows whose start has arrived
// and force-completes windows that have closed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::voting::Completion;
use super::Engine;
use crate::db::{matches, MatchStatus};
use crate::error::Result;
use crate::metrics;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Scheduled windows opened.
    pub opened: usize,
    /// Expired windows resolved from their tally.
    pub closed: usize,
    /// Expired windows someone else resolved first.
    pub already_resolved: usize,
    /// Matches that failed; each is logged and retried on the next sweep.
    pub failed: usize,
}

impl Engine {
    pub async fn sweep_deadlines(&self) -> Result<SweepReport> {
        self.sweep_deadlines_at(Utc::now()).await
    }

    /// One pass over every open or scheduled window of active competitions.
    /// A failure on one match does not stop the pass.
    pub async fn sweep_deadlines_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let timer = metrics::SWEEP_DURATION_SECONDS.start_timer();
        let windowed = {
            let mut conn = self.db.acquire().await?;
            matches::list_windowed(&mut conn).await?
        };

        let mut report = SweepReport::default();
        for m in windowed {
            let mut status = m.status;

            if status == MatchStatus::Scheduled && m.voting_opens_at.is_some_and(|t| t <= now) {
                match self.open_scheduled_at(&m, now).await {
                    Ok(true) => {
                        report.opened += 1;
                        status = MatchStatus::Voting;
                    }
                    Ok(false) => continue,
                    Err(e) => {
                        tracing::error!(match_id = m.id, "sweeper failed to open voting: {e}");
                        report.failed += 1;
                        continue;
                    }
                }
            }

            let expired = m.voting_closes_at.is_some_and(|t| t <= now);
            if status != MatchStatus::Voting || !expired {
                continue;
            }
            match self.complete_at(m.id, None, now).await {
                Ok(Completion::Resolved { .. }) => report.closed += 1,
                Ok(Completion::AlreadyResolved { .. }) => report.already_resolved += 1,
                Err(e) => {
                    tracing::error!(match_id = m.id, "sweeper failed to close voting: {e}");
                    report.failed += 1;
                }
            }
        }

        let purged = self.markers.purge_expired(now);
        if purged > 0 {
            tracing::debug!("purged {purged} expired vote markers");
        }

        timer.observe_duration();
        metrics::SWEEPER_RUNS_TOTAL.inc();
        metrics::SWEEPER_MATCHES_CLOSED_TOTAL.inc_by(report.closed as u64);
        if report == SweepReport::default() {
            tracing::debug!("deadline sweep: nothing due");
        } else {
            tracing::info!(
                "deadline sweep: {} opened, {} closed, {} already resolved, {} failed",
                report.opened,
                report.closed,
                report.already_resolved,
                report.failed
            );
        }
        Ok(report)
    }
}

/// Run the deadline sweeper every `interval` until the task is aborted.
pub fn spawn_deadline_sweeper(engine: Engine, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = engine.sweep_deadlines().await {
                tracing::error!("deadline sweep failed: {e}");
            }
        }
    })
}
