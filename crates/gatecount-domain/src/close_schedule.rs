use crate::day_window::at_hour;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use std::collections::HashSet;

/// Static closing configuration: nightly hours, weekly closure days and the
/// watch thresholds. Everything the anomaly heuristic tunes lives here.
#[derive(Debug, Clone)]
pub struct CloseConfig {
    /// Nightly closing range `(start_hour, end_hour)`; the end hour is
    /// smaller than the start hour, the range spans midnight.
    pub night_hours: (u32, u32),
    /// Weekdays the building stays closed all day.
    pub week_close_days: HashSet<Weekday>,
    /// How far ahead the closed-calendar is consulted, in days.
    pub horizon_days: i64,
    /// Poll interval of the watch while inside a closed window.
    pub refresh_secs: u64,
    /// Net headcount that raises an anomaly alert.
    pub trigger_headcount: i64,
    /// Upper bound on the suspicion window, in hours.
    pub renew_ceiling_hours: i64,
    /// Hour at which recap/night reports go out.
    pub night_report_hour: u32,
}

impl Default for CloseConfig {
    fn default() -> Self {
        Self {
            night_hours: (20, 7),
            week_close_days: [Weekday::Sat, Weekday::Sun].into_iter().collect(),
            horizon_days: 60,
            refresh_secs: 30,
            trigger_headcount: 1,
            renew_ceiling_hours: 1,
            night_report_hour: 8,
        }
    }
}

impl CloseConfig {
    pub fn refresh(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_secs)
    }

    pub fn renew_ceiling(&self) -> chrono::Duration {
        chrono::Duration::hours(self.renew_ceiling_hours)
    }
}

/// A contiguous closed time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosePeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ClosePeriod {
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }
}

/// Whether `dt` falls inside the nightly range or on a weekly closure day.
pub fn is_night_or_weekend(config: &CloseConfig, dt: DateTime<Utc>) -> bool {
    let (night_start, night_end) = config.night_hours;
    let mut start = at_hour(dt, night_start);
    if dt < start {
        start -= chrono::Duration::days(1);
    }
    let end = at_hour(start, night_end) + chrono::Duration::days(1);
    if start <= dt && dt <= end {
        return true;
    }
    config.week_close_days.contains(&dt.weekday())
}

/// Whether `dt` is an all-day closure: weekly closure or calendar date.
pub fn is_close_date(
    config: &CloseConfig,
    dt: DateTime<Utc>,
    closed_dates: &HashSet<NaiveDate>,
) -> bool {
    config.week_close_days.contains(&dt.weekday()) || closed_dates.contains(&dt.date_naive())
}

/// The closed window active at or following `from`.
///
/// When `from` is already inside a night/weekend/calendar closure the window
/// starts immediately; otherwise at the next nightly boundary. The end is
/// the following nightly end boundary, pushed forward a day at a time while
/// each further day is itself closed, so that contiguous closed days merge
/// into one window.
pub fn close_range(
    config: &CloseConfig,
    from: DateTime<Utc>,
    closed_dates: &HashSet<NaiveDate>,
) -> ClosePeriod {
    let (night_start, night_end) = config.night_hours;

    let mut start = from;
    if !is_night_or_weekend(config, from) && !closed_dates.contains(&from.date_naive()) {
        start = at_hour(from, night_start);
    }

    let mut end = at_hour(start, night_end);
    if end <= start {
        end += chrono::Duration::days(1);
    }

    let mut probe = end + chrono::Duration::minutes(1);
    while is_night_or_weekend(config, probe) || closed_dates.contains(&probe.date_naive()) {
        probe += chrono::Duration::days(1);
        end = at_hour(probe, probe.hour());
    }

    ClosePeriod { start, end }
}

/// Whether `[start, end]` is no longer than one nightly range around `now`;
/// used to skip recap mails for plain nights already covered by the daily
/// night report.
pub fn was_night_range(
    config: &CloseConfig,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    let (night_start, night_end) = config.night_hours;
    let mut range_start = at_hour(now, night_start);
    if now < range_start {
        range_start -= chrono::Duration::days(1);
    }
    let range_end = at_hour(range_start, night_end) + chrono::Duration::days(1);
    end - start <= range_end - range_start
}
