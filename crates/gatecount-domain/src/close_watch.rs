use crate::clock::Clock;
use crate::close_schedule::{close_range, was_night_range, CloseConfig, ClosePeriod};
use crate::counts::DeviceSelector;
use crate::error::DomainResult;
use crate::mail::AlertMailer;
use crate::occupancy::OccupancyService;
use crate::repository::{CloseCalendarRepository, CountRecordRepository};
use crate::reports::event_lines;
use crate::scheduler::Scheduler;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Outcome of one suspicion observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspicionEvent {
    /// Net headcount reached the trigger; `since` is the window start the
    /// detection covers, before the reset.
    Alert {
        inside: i64,
        since: DateTime<Utc>,
    },
    /// More exits than entries: estimate drifted, start over.
    DriftReset,
    /// The quiet stretch exceeded the ceiling and was clamped forward.
    CeilingClamp,
    Quiet,
}

/// Rolling "someone might be inside" window used by the watch.
///
/// The start moves forward on every alert (so one intruder isn't reported
/// every refresh), on negative drift, and when the quiet stretch exceeds
/// the configured ceiling (bounding alert-silence to the ceiling).
#[derive(Debug)]
pub struct SuspicionWindow {
    start: DateTime<Utc>,
    trigger: i64,
    ceiling: chrono::Duration,
}

impl SuspicionWindow {
    pub fn new(start: DateTime<Utc>, config: &CloseConfig) -> Self {
        Self {
            start,
            trigger: config.trigger_headcount,
            ceiling: config.renew_ceiling(),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn observe(&mut self, now: DateTime<Utc>, entered: i64, exited: i64) -> SuspicionEvent {
        let inside = entered - exited;
        if inside >= self.trigger {
            let since = self.start;
            self.start = now;
            return SuspicionEvent::Alert { inside, since };
        }
        if entered < exited {
            self.start = now;
            return SuspicionEvent::DriftReset;
        }
        if now - self.start > self.ceiling {
            self.start = now - self.ceiling;
            return SuspicionEvent::CeilingClamp;
        }
        SuspicionEvent::Quiet
    }
}

/// Watches occupancy during closed periods and alerts on activity.
///
/// Each cycle computes the active/next closed window from config plus the
/// external calendar, arms one scheduler shot for its start, polls while
/// inside, then recaps and recomputes. A failed cycle never stops the
/// watch.
pub struct CloseWatch {
    counts: Arc<dyn CountRecordRepository>,
    calendar: Arc<dyn CloseCalendarRepository>,
    occupancy: Arc<OccupancyService>,
    mailer: Arc<AlertMailer>,
    clock: Arc<dyn Clock>,
    config: CloseConfig,
}

impl CloseWatch {
    pub fn new(
        counts: Arc<dyn CountRecordRepository>,
        calendar: Arc<dyn CloseCalendarRepository>,
        occupancy: Arc<OccupancyService>,
        mailer: Arc<AlertMailer>,
        clock: Arc<dyn Clock>,
        config: CloseConfig,
    ) -> Self {
        Self {
            counts,
            calendar,
            occupancy,
            mailer,
            clock,
            config,
        }
    }

    pub async fn run(&self, token: CancellationToken) -> Result<(), anyhow::Error> {
        let scheduler = Scheduler::new(self.clock.clone(), token.clone());
        while !token.is_cancelled() {
            let window = match self.next_window().await {
                Ok(window) => window,
                Err(err) => {
                    error!(error = %err, "failed to compute closed window");
                    if !scheduler.sleep(self.config.refresh()).await {
                        break;
                    }
                    continue;
                }
            };
            info!(start = %window.start, end = %window.end, "closed-period watch armed");
            scheduler
                .schedule_once(window.start, || self.watch_window(&scheduler, &window))
                .await;
        }
        Ok(())
    }

    async fn next_window(&self) -> DomainResult<ClosePeriod> {
        let now = self.clock.now();
        let closed = self
            .calendar
            .closed_dates_in_range(now.date_naive(), self.config.horizon_days)
            .await?;
        Ok(close_range(&self.config, now, &closed))
    }

    async fn watch_window(
        &self,
        scheduler: &Scheduler,
        window: &ClosePeriod,
    ) -> DomainResult<()> {
        let mut suspicion = SuspicionWindow::new(window.start, &self.config);
        loop {
            let now = self.clock.now();
            if !(suspicion.start() <= now && now < window.end) {
                break;
            }
            if !scheduler.sleep(self.config.refresh()).await {
                // cancelled mid-window: no recap
                return Ok(());
            }
            if let Err(err) = self.watch_cycle(&mut suspicion, window).await {
                error!(error = %err, "closed-period watch cycle failed");
            }
        }
        if let Err(err) = self.send_recap(window).await {
            error!(error = %err, "closed-period recap failed");
        }
        Ok(())
    }

    async fn watch_cycle(
        &self,
        suspicion: &mut SuspicionWindow,
        window: &ClosePeriod,
    ) -> DomainResult<()> {
        let now = self.clock.now();
        let totals = self
            .counts
            .sum_in_range(DeviceSelector::All, suspicion.start(), window.end, false)
            .await?;
        let (entered, exited) = totals
            .first()
            .map(|row| (row.entered, row.exited))
            .unwrap_or((0, 0));

        match suspicion.observe(now, entered, exited) {
            SuspicionEvent::Alert { inside, since } => {
                let today = self.occupancy.occupancy_now(DeviceSelector::All).await?;
                let body = format!(
                    "Someone in the building:\n\
                     \tDetected {inside} person(s) inside in time-range {since} --- {now}\n\n\
                     Total people estimated today: {}\n\n\
                     For further information, please inspect the event list\n",
                    today.total()
                );
                self.mailer
                    .broadcast_anomaly("Anomalous Activity in Close Time", &body, None)
                    .await?;
                info!(inside, "closed-period anomaly alert sent");
            }
            SuspicionEvent::DriftReset => {
                info!(entered, exited, "net-negative drift, suspicion window reset");
            }
            SuspicionEvent::CeilingClamp => {
                info!("suspicion window clamped to the renewal ceiling");
            }
            SuspicionEvent::Quiet => {}
        }
        Ok(())
    }

    async fn send_recap(&self, window: &ClosePeriod) -> DomainResult<()> {
        let now = self.clock.now();
        if was_night_range(&self.config, window.start, window.end, now) {
            // plain nights are already covered by the daily night report
            return Ok(());
        }

        let events = self
            .counts
            .events_in_range(DeviceSelector::All, window.start, window.end)
            .await?;
        let lines = event_lines(&events);

        let mut body = format!(
            "Activity during close time: {} --- {}\n",
            window.start, window.end
        );
        if lines.is_empty() {
            body.push_str("Nothing to report");
        } else {
            for line in &lines {
                body.push_str(&format!("\t{line}\n"));
            }
        }

        let send_at = crate::day_window::at_hour(now, self.config.night_report_hour);
        let delay_until = if send_at > now { Some(send_at) } else { None };
        self.mailer
            .broadcast_anomaly("[Recap] Activity in Closing Time", &body, delay_until)
            .await?;
        info!("closed-period recap sent");
        Ok(())
    }
}
