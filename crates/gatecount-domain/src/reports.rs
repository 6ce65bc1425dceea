use crate::clock::Clock;
use crate::close_schedule::{is_close_date, CloseConfig};
use crate::counts::{CountRecord, DeviceSelector};
use crate::day_window::at_hour;
use crate::error::DomainResult;
use crate::mail::AlertMailer;
use crate::occupancy::OccupancyService;
use crate::repository::{
    CloseCalendarRepository, CountRecordRepository, MismatchRepository, StatusLogRepository,
};
use crate::scheduler::{Recurrence, Scheduler};
use crate::status::MismatchRecord;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Human-readable lines for a list of counting events, used in report and
/// recap mail bodies.
pub fn event_lines(events: &[CountRecord]) -> Vec<String> {
    events
        .iter()
        .map(|event| {
            let when = DateTime::<Utc>::from_timestamp(event.timestamp, 0)
                .map(|dt| dt.to_string())
                .unwrap_or_else(|| event.timestamp.to_string());
            let mut line = format!("[{when}] from {}: ", event.device_id);
            if event.entered != 0 {
                line.push_str(&format!("{} person(s) entered", event.entered));
            }
            if event.entered != 0 && event.exited != 0 {
                line.push_str(", ");
            } else if event.entered == 0 && event.exited == 0 {
                line.push_str("no entrances or exits");
            }
            if event.exited != 0 {
                line.push_str(&format!("{} person(s) exited", event.exited));
            }
            line.push('.');
            line
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Hour of the daily mismatch report.
    pub mismatch_report_hour: u32,
    /// Hour of the daily night-activity report.
    pub night_report_hour: u32,
    /// Records older than this many days are purged by the cleanup task.
    pub cleanup_retention_days: i64,
    /// Cleanup period in days.
    pub cleanup_every_days: u64,
    /// The daily reset hour pair, mirrored from the occupancy config; each
    /// distinct hour gets a mismatch probe.
    pub daily_reset_hours: (u32, u32),
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            mismatch_report_hour: 9,
            night_report_hour: 8,
            cleanup_retention_days: 365,
            cleanup_every_days: 1,
            daily_reset_hours: (0, 0),
        }
    }
}

/// The recurring report/maintenance tasks recovered from the collector:
/// daily mismatch report, night activity report, store cleanup.
pub struct ReportTasks {
    counts: Arc<dyn CountRecordRepository>,
    status_log: Arc<dyn StatusLogRepository>,
    mismatches: Arc<dyn MismatchRepository>,
    calendar: Arc<dyn CloseCalendarRepository>,
    occupancy: Arc<OccupancyService>,
    mailer: Arc<AlertMailer>,
    clock: Arc<dyn Clock>,
    close_config: CloseConfig,
    config: ReportConfig,
}

impl ReportTasks {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        counts: Arc<dyn CountRecordRepository>,
        status_log: Arc<dyn StatusLogRepository>,
        mismatches: Arc<dyn MismatchRepository>,
        calendar: Arc<dyn CloseCalendarRepository>,
        occupancy: Arc<OccupancyService>,
        mailer: Arc<AlertMailer>,
        clock: Arc<dyn Clock>,
        close_config: CloseConfig,
        config: ReportConfig,
    ) -> Self {
        Self {
            counts,
            status_log,
            mismatches,
            calendar,
            occupancy,
            mailer,
            clock,
            close_config,
            config,
        }
    }

    pub async fn mismatch_report_loop(
        self: Arc<Self>,
        token: CancellationToken,
    ) -> Result<(), anyhow::Error> {
        let scheduler = Scheduler::new(self.clock.clone(), token);
        let hour = self.config.mismatch_report_hour;
        let tasks = self.clone();
        scheduler
            .schedule_recurring(Recurrence::DailyAt { hour }, move || {
                let tasks = tasks.clone();
                async move { tasks.daily_mismatch_report().await }
            })
            .await
    }

    pub async fn night_report_loop(
        self: Arc<Self>,
        token: CancellationToken,
    ) -> Result<(), anyhow::Error> {
        let scheduler = Scheduler::new(self.clock.clone(), token);
        let hour = self.config.night_report_hour;
        let tasks = self.clone();
        scheduler
            .schedule_recurring(Recurrence::DailyAt { hour }, move || {
                let tasks = tasks.clone();
                async move { tasks.night_report().await }
            })
            .await
    }

    pub async fn cleanup_loop(
        self: Arc<Self>,
        token: CancellationToken,
    ) -> Result<(), anyhow::Error> {
        let scheduler = Scheduler::new(self.clock.clone(), token);
        let period = Duration::from_secs(self.config.cleanup_every_days * SECS_PER_DAY);
        let tasks = self.clone();
        scheduler
            .schedule_recurring(Recurrence::Every(period), move || {
                let tasks = tasks.clone();
                async move { tasks.cleanup().await }
            })
            .await
    }

    /// Probes yesterday's occupancy just past each reset boundary, records
    /// the residues, and mails the nonzero ones.
    pub async fn daily_mismatch_report(&self) -> DomainResult<()> {
        let now = self.clock.now();
        let yesterday = now - chrono::Duration::days(1);

        let mut hours = vec![self.config.daily_reset_hours.0, self.config.daily_reset_hours.1];
        hours.sort_unstable();
        hours.dedup();

        let mut residues: Vec<(DateTime<Utc>, crate::counts::Occupancy)> = Vec::new();
        for hour in hours {
            let probe = at_hour(yesterday, hour) + chrono::Duration::seconds(1);
            let result = self
                .occupancy
                .occupancy_at(DeviceSelector::All, probe)
                .await?;
            self.mismatches
                .insert(MismatchRecord {
                    timestamp: now.timestamp(),
                    entered: result.entered,
                    exited: result.exited,
                    estimated: result.total(),
                })
                .await?;
            if result.total() != 0 {
                residues.push((probe, result));
            }
        }

        if residues.is_empty() {
            return Ok(());
        }

        let mut body = format!("Daily report performed @ {now}\n\n");
        for (probe, result) in &residues {
            body.push_str(&format!(
                "Mismatch for reset after {probe}:\n\tin = {}, out = {}, estimated = {}\n\n",
                result.entered,
                result.exited,
                result.total()
            ));
        }
        self.mailer
            .broadcast_alert("Daily Mismatch Report", &body)
            .await?;
        info!("daily mismatch report sent");
        Ok(())
    }

    /// On working days, mails the last night-range entry/exit events.
    pub async fn night_report(&self) -> DomainResult<()> {
        let now = self.clock.now();
        let yesterday = now - chrono::Duration::days(1);
        let closed = self
            .calendar
            .closed_dates_in_range(yesterday.date_naive(), self.close_config.horizon_days)
            .await?;
        if is_close_date(&self.close_config, now, &closed)
            || is_close_date(&self.close_config, yesterday, &closed)
        {
            info!("night activity report skipped for close day");
            return Ok(());
        }

        let (night_start_hour, night_end_hour) = self.close_config.night_hours;
        let start = at_hour(yesterday, night_start_hour);
        let end = at_hour(start, night_end_hour) + chrono::Duration::days(1);
        let events = self
            .counts
            .events_in_range(DeviceSelector::All, start, end)
            .await?;
        let lines = event_lines(&events);

        let mut body = format!("Night report: {start} --- {end}\n");
        if lines.is_empty() {
            body.push_str("Nothing to report\n");
        } else {
            for line in &lines {
                body.push_str(&format!("\t{line}\n"));
            }
        }
        self.mailer
            .broadcast_anomaly("Night Activity Report", &body, None)
            .await?;
        info!("night activity report sent");
        Ok(())
    }

    /// Purges records beyond the retention horizon from every store and
    /// mails a deletion summary.
    pub async fn cleanup(&self) -> DomainResult<()> {
        let cutoff = self.clock.now() - chrono::Duration::days(self.config.cleanup_retention_days);
        let counts = self.counts.delete_before(cutoff).await?;
        let status = self.status_log.delete_before(cutoff).await?;
        let mismatches = self.mismatches.delete_before(cutoff).await?;
        info!(counts, status, mismatches, %cutoff, "store cleanup complete");

        let body = format!(
            "Cleanup done. Deleted all records older than {cutoff}\n\
             \t- counts: {counts}\n\
             \t- status: {status}\n\
             \t- mismatches: {mismatches}\n"
        );
        self.mailer.broadcast_alert("Cleanup Report", &body).await?;
        Ok(())
    }
}
