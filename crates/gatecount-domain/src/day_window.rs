use chrono::{DateTime, Timelike, Utc};

/// `dt` moved to `hour:00:00` on its own date.
pub(crate) fn at_hour(dt: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    dt.date_naive()
        .and_hms_opt(hour, 0, 0)
        .expect("hour in 0..24")
        .and_utc()
}

/// The "today" accounting window around `now`, delimited by the daily reset
/// hour pair.
///
/// The naive window is `[reset_start, reset_end]` on `now`'s date; when it
/// straddles midnight it is shifted one day towards `now`, and when `now`
/// falls outside it entirely the complement window containing `now` is
/// returned. Boundaries are inclusive on both ends.
pub fn day_window(reset_hours: (u32, u32), now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let (start_hour, end_hour) = reset_hours;
    let mut start = at_hour(now, start_hour);
    let mut end = at_hour(now, end_hour);

    if end <= start && start < now {
        end += chrono::Duration::days(1);
    } else if end <= start && now < start {
        start -= chrono::Duration::days(1);
    }

    if start <= now && now <= end {
        (start, end)
    } else {
        if now.hour() >= end_hour {
            start += chrono::Duration::days(1);
        } else {
            end -= chrono::Duration::days(1);
        }
        (end, start)
    }
}
