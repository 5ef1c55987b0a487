//! Local-time arithmetic for a single fixed UTC offset.
//!
//! Slot dates are calendar days in the configured offset (UTC+5:45 by default),
//! and slot hours are local hours of that day. Every function here takes the
//! offset explicitly; nothing reads the host time zone.

use std::sync::Mutex;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc, Weekday};

/// UTC+5:45.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 345;

/// Lowercase weekday names indexed by `Weekday::num_days_from_sunday`.
pub const WEEKDAY_NAMES: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

pub fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(minutes.checked_mul(60)?)
}

pub fn local_now(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    now.with_timezone(&offset)
}

pub fn local_today(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    local_now(now, offset).date_naive()
}

pub fn local_hour(now: DateTime<Utc>, offset: FixedOffset) -> u8 {
    local_now(now, offset).hour() as u8
}

/// The instant `hour:00` local time on `date`. `hour` may be 24 (next midnight).
pub fn local_instant(date: NaiveDate, hour: u8, offset: FixedOffset) -> DateTime<FixedOffset> {
    let local = date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(hour));
    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, offset)
}

pub fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<FixedOffset> {
    local_instant(date, 0, offset)
}

pub fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAY_NAMES[day.num_days_from_sunday() as usize]
}

pub fn date_weekday_name(date: NaiveDate) -> &'static str {
    weekday_name(date.weekday())
}

pub fn parse_weekday(name: &str) -> Option<Weekday> {
    let idx = WEEKDAY_NAMES.iter().position(|d| d.eq_ignore_ascii_case(name))?;
    Some(match idx {
        0 => Weekday::Sun,
        1 => Weekday::Mon,
        2 => Weekday::Tue,
        3 => Weekday::Wed,
        4 => Weekday::Thu,
        5 => Weekday::Fri,
        _ => Weekday::Sat,
    })
}

/// Inclusive day iterator. Empty when `from > to`.
pub fn days_inclusive(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    from.iter_days().take_while(move |d| *d <= to)
}

/// Source of "now". Injected so tests can pin the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Pin the clock to `hour:minute` local time on `date`.
    pub fn at_local(date: NaiveDate, hour: u8, minute: u32, offset: FixedOffset) -> Self {
        let instant = local_instant(date, hour, offset) + Duration::minutes(i64::from(minute));
        Self::new(instant.with_timezone(&Utc))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npt() -> FixedOffset {
        offset_from_minutes(DEFAULT_UTC_OFFSET_MINUTES).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn local_midnight_is_not_utc_midnight() {
        let m = local_midnight(ymd(2024, 6, 1), npt()).with_timezone(&Utc);
        assert_eq!(m.to_rfc3339(), "2024-05-31T18:15:00+00:00");
    }

    #[test]
    fn today_rolls_over_before_utc_does() {
        // 18:30 UTC on May 31 is already 00:15 on June 1 in UTC+5:45.
        let now = DateTime::parse_from_rfc3339("2024-05-31T18:30:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(local_today(now, npt()), ymd(2024, 6, 1));
        assert_eq!(local_hour(now, npt()), 0);
    }

    #[test]
    fn hour_24_is_next_midnight() {
        let end = local_instant(ymd(2024, 6, 1), 24, npt());
        assert_eq!(end, local_midnight(ymd(2024, 6, 2), npt()));
    }

    #[test]
    fn weekday_names_round_trip() {
        for name in WEEKDAY_NAMES {
            let day = parse_weekday(name).unwrap();
            assert_eq!(weekday_name(day), name);
        }
        assert_eq!(parse_weekday("Monday"), Some(Weekday::Mon));
        assert_eq!(parse_weekday("mon"), None);
        // 2024-06-01 was a Saturday
        assert_eq!(date_weekday_name(ymd(2024, 6, 1)), "saturday");
    }

    #[test]
    fn days_inclusive_bounds() {
        let days: Vec<_> = days_inclusive(ymd(2024, 6, 1), ymd(2024, 6, 3)).collect();
        assert_eq!(days, vec![ymd(2024, 6, 1), ymd(2024, 6, 2), ymd(2024, 6, 3)]);
        assert_eq!(days_inclusive(ymd(2024, 6, 3), ymd(2024, 6, 1)).count(), 0);
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::at_local(ymd(2024, 6, 1), 10, 30, npt());
        assert_eq!(local_hour(clock.now(), npt()), 10);
        clock.advance(Duration::hours(2));
        assert_eq!(local_hour(clock.now(), npt()), 12);
    }
}
