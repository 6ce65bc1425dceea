use crate::clock::Clock;
use crate::error::DomainResult;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// When a recurring task fires again.
#[derive(Debug, Clone, Copy)]
pub enum Recurrence {
    /// Fixed period between cycle ends.
    Every(Duration),
    /// Once a day at the given hour (minute zero).
    DailyAt { hour: u32 },
}

/// Timer/trigger abstraction behind the periodic tasks: the liveness sweep
/// and the reports run through [`Scheduler::schedule_recurring`], the
/// closed-period watch arms one [`Scheduler::schedule_once`] per cycle.
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    token: CancellationToken,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>, token: CancellationToken) -> Self {
        Self { clock, token }
    }

    /// Sleeps for `duration`; false when cancelled first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Sleeps until the wall clock reaches `at`; false when cancelled
    /// first. Re-checks the clock at most once a minute, so a drifting or
    /// manually adjusted clock is picked up.
    pub async fn sleep_until(&self, at: DateTime<Utc>) -> bool {
        loop {
            let now = self.clock.now();
            if now >= at {
                return true;
            }
            let remaining = (at - now).to_std().unwrap_or(Duration::ZERO);
            let nap = remaining.min(Duration::from_secs(60));
            if !self.sleep(nap).await {
                return false;
            }
        }
    }

    /// Runs `task` once when the wall clock reaches `at`. A cancelled wait
    /// skips the task; a task error is logged.
    pub async fn schedule_once<F, Fut>(&self, at: DateTime<Utc>, task: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DomainResult<()>>,
    {
        if !self.sleep_until(at).await {
            return;
        }
        if let Err(err) = task().await {
            error!(error = %err, "scheduled task failed");
        }
    }

    /// Runs `cycle` on `recurrence` until cancelled. A failing cycle is
    /// logged and the schedule continues; a single failure never stops the
    /// task.
    pub async fn schedule_recurring<F, Fut>(
        &self,
        recurrence: Recurrence,
        mut cycle: F,
    ) -> Result<(), anyhow::Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DomainResult<()>>,
    {
        loop {
            let fired = match recurrence {
                Recurrence::Every(period) => self.sleep(period).await,
                Recurrence::DailyAt { hour } => {
                    self.sleep_until(next_daily(self.clock.now(), hour)).await
                }
            };
            if !fired {
                return Ok(());
            }
            if let Err(err) = cycle().await {
                error!(error = %err, "recurring task cycle failed");
            }
        }
    }
}

/// Next occurrence of `hour:00:00` strictly after `now`.
fn next_daily(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let today = now
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .expect("hour in 0..24")
        .and_utc();
    if now < today {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}
