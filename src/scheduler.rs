//! Daily schedule arithmetic.
//!
//! A schedule is one wall-clock time of day. `next_run_after` finds the next
//! occurrence strictly after a given instant in that instant's timezone, so
//! the daemon runs at the same local time year round. Around DST changes a
//! scheduled time can vanish (spring forward) or happen twice (fall back):
//! vanished times advance to the first valid minute, doubled times take the
//! earlier instant.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// When the daily dump cycle runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default = "default_hour")]
    pub hour: u32,
    #[serde(default = "default_minute")]
    pub minute: u32,
    /// Dump immediately when the daemon starts, then follow the schedule
    #[serde(default)]
    pub run_on_start: bool,
}

fn default_hour() -> u32 {
    2
}

fn default_minute() -> u32 {
    30
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            hour: default_hour(),
            minute: default_minute(),
            run_on_start: false,
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Schedule {
    /// Next occurrence of the scheduled time strictly after `now`,
    /// in `now`'s timezone
    pub fn next_run_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let mut date = now.date_naive();

        for _ in 0..4 {
            if let Some(candidate) = resolve_local(&tz, date, self.hour, self.minute) {
                if candidate > *now {
                    return candidate;
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }

        // Only reachable at the end of the calendar
        now.clone() + Duration::days(1)
    }
}

/// Map a local date + time of day onto an instant, stepping over DST gaps
/// minute by minute and taking the earlier side of DST overlaps
fn resolve_local<Tz: TimeZone>(
    tz: &Tz,
    date: NaiveDate,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Tz>> {
    let mut naive = date.and_hms_opt(hour, minute, 0)?;

    // DST gaps are an hour, occasionally two; 180 minutes is plenty
    for _ in 0..180 {
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => return Some(t),
            LocalResult::Ambiguous(earlier, _) => return Some(earlier),
            LocalResult::None => naive += Duration::minutes(1),
        }
    }
    None
}

/// True when the daemon should dump immediately instead of waiting for the
/// next tick: never succeeded, or the last success is more than a day old
pub fn catch_up_due(last_success: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_success {
        Some(t) => now - t > Duration::hours(24),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn schedule(hour: u32, minute: u32) -> Schedule {
        Schedule {
            hour,
            minute,
            run_on_start: false,
        }
    }

    #[test]
    fn test_defaults() {
        let s = Schedule::default();
        assert_eq!(s.hour, 2);
        assert_eq!(s.minute, 30);
        assert!(!s.run_on_start);
        assert_eq!(s.to_string(), "02:30");
    }

    #[test]
    fn test_next_run_later_today() {
        let now = Utc.with_ymd_and_hms(2026, 8, 20, 1, 0, 0).unwrap();
        let next = schedule(2, 30).next_run_after(&now);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 20, 2, 30, 0).unwrap());
    }

    #[test]
    fn test_next_run_tomorrow_when_past() {
        let now = Utc.with_ymd_and_hms(2026, 8, 20, 14, 0, 0).unwrap();
        let next = schedule(2, 30).next_run_after(&now);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 21, 2, 30, 0).unwrap());
    }

    #[test]
    fn test_next_run_is_strictly_after() {
        // Exactly on the tick: schedule the next day, not this instant
        let now = Utc.with_ymd_and_hms(2026, 8, 20, 2, 30, 0).unwrap();
        let next = schedule(2, 30).next_run_after(&now);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 21, 2, 30, 0).unwrap());
    }

    #[test]
    fn test_next_run_crosses_month_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 8, 31, 23, 0, 0).unwrap();
        let next = schedule(2, 30).next_run_after(&now);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 9, 1, 2, 30, 0).unwrap());
    }

    #[test]
    fn test_next_run_in_fixed_offset_zone() {
        // 20:00 UTC = 05:00 next day in +09:00; the 02:30 local tick has
        // already passed there, so we get the day after in local terms
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2026, 8, 21, 5, 0, 0).unwrap();
        let next = schedule(2, 30).next_run_after(&now);
        assert_eq!(next, tz.with_ymd_and_hms(2026, 8, 22, 2, 30, 0).unwrap());
        assert_eq!(next.offset(), now.offset());
    }

    #[test]
    fn test_resolve_local_plain_time() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();
        let resolved = resolve_local(&Utc, date, 2, 30).unwrap();
        assert_eq!(resolved, Utc.with_ymd_and_hms(2026, 8, 20, 2, 30, 0).unwrap());
    }

    #[test]
    fn test_resolve_local_rejects_bad_time() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();
        assert!(resolve_local(&Utc, date, 24, 0).is_none());
    }

    #[test]
    fn test_catch_up_due() {
        let now = Utc.with_ymd_and_hms(2026, 8, 20, 12, 0, 0).unwrap();

        assert!(catch_up_due(None, now));
        assert!(catch_up_due(
            Some(now - Duration::hours(25)),
            now
        ));
        assert!(!catch_up_due(
            Some(now - Duration::hours(23)),
            now
        ));
    }

    #[test]
    fn test_schedule_parses_from_toml() {
        let s: Schedule = toml::from_str("hour = 5\nminute = 15\nrun_on_start = true").unwrap();
        assert_eq!(s.hour, 5);
        assert_eq!(s.minute, 15);
        assert!(s.run_on_start);

        let empty: Schedule = toml::from_str("").unwrap();
        assert_eq!(empty.hour, 2);
        assert_eq!(empty.minute, 30);
    }
}
