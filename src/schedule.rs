//! Weekly opening-hours parsing.
//!
//! Venues enter hours as `"<weekday> <open><am|pm>-<close><am|pm>"` lines or as
//! `{day, open, close}` records. Anything that does not parse is dropped with a
//! warning and the weekday is treated as closed.

use std::collections::BTreeMap;
use std::ops::Range;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::calendar::{parse_weekday, weekday_name, WEEKDAY_NAMES};

/// Open hours for one weekday, 24-hour clock, `end_hour` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl DayHours {
    /// Slot start hours. Empty when the close hour is not after the open hour.
    pub fn hours(&self) -> Range<u8> {
        self.start_hour..self.end_hour.max(self.start_hour)
    }

    pub fn slot_count(&self) -> usize {
        self.hours().len()
    }
}

/// Per-weekday parse outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayEntry {
    Open(DayHours),
    Closed,
    /// The weekday was named but its hours could not be read.
    Unparseable,
}

/// `{day, open, close}` as stored on the venue detail record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub day: String,
    pub open: String,
    pub close: String,
}

/// Tagged outcome for all seven weekdays, before collapsing to a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedWeek {
    entries: [DayEntry; 7],
}

impl Default for ParsedWeek {
    fn default() -> Self {
        Self { entries: [DayEntry::Closed; 7] }
    }
}

impl ParsedWeek {
    pub fn entry(&self, day: Weekday) -> DayEntry {
        self.entries[day.num_days_from_sunday() as usize]
    }

    fn set(&mut self, day: Weekday, entry: DayEntry) {
        self.entries[day.num_days_from_sunday() as usize] = entry;
    }

    /// Collapse `Closed` and `Unparseable` into "no hours".
    pub fn schedule(&self) -> WeeklySchedule {
        let mut days = [None; 7];
        for (slot, entry) in days.iter_mut().zip(self.entries.iter()) {
            if let DayEntry::Open(hours) = entry {
                *slot = Some(*hours);
            }
        }
        WeeklySchedule { days }
    }
}

/// Weekday → open hours. A missing weekday means the venue is closed that day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    days: [Option<DayHours>; 7],
}

/// `{"startHour": "06:00", "endHour": "22:00"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoursLabel {
    #[serde(rename = "startHour")]
    pub start_hour: String,
    #[serde(rename = "endHour")]
    pub end_hour: String,
}

impl WeeklySchedule {
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        parse_lines(lines).schedule()
    }

    pub fn from_records(records: &[OpeningHours]) -> Self {
        parse_records(records).schedule()
    }

    pub fn get(&self, day: Weekday) -> Option<DayHours> {
        self.days[day.num_days_from_sunday() as usize]
    }

    pub fn for_date(&self, date: NaiveDate) -> Option<DayHours> {
        self.get(date.weekday())
    }

    pub fn is_closed_every_day(&self) -> bool {
        self.days.iter().all(Option::is_none)
    }

    /// Lowercase weekday → `HH:00` labels, open days only.
    pub fn labels(&self) -> BTreeMap<&'static str, HoursLabel> {
        WEEKDAY_NAMES
            .iter()
            .zip(self.days.iter())
            .filter_map(|(name, hours)| {
                hours.map(|h| {
                    (
                        *name,
                        HoursLabel {
                            start_hour: format!("{:02}:00", h.start_hour),
                            end_hour: format!("{:02}:00", h.end_hour),
                        },
                    )
                })
            })
            .collect()
    }
}

/// `"6am"` → 6, `"12am"` → 0, `"12pm"` → 12, `"10pm"` → 22.
pub fn parse_hour(raw: &str) -> Option<u8> {
    let raw = raw.trim().to_ascii_lowercase();
    let (digits, pm) = if let Some(d) = raw.strip_suffix("pm") {
        (d, true)
    } else if let Some(d) = raw.strip_suffix("am") {
        (d, false)
    } else {
        return None;
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: u8 = digits.parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    Some(match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    })
}

fn hours_entry(open: &str, close: &str, source: &str) -> DayEntry {
    match (parse_hour(open), parse_hour(close)) {
        (Some(start_hour), Some(end_hour)) => DayEntry::Open(DayHours { start_hour, end_hour }),
        _ => {
            warn!("skipping invalid time format in opening hours: {source}");
            DayEntry::Unparseable
        }
    }
}

/// Parse one `"<weekday> <open>-<close>"` line. `None` when the weekday itself is bad.
pub fn parse_line(line: &str) -> Option<(Weekday, DayEntry)> {
    let line = line.trim();
    let (day, rest) = line.split_once(' ').unwrap_or((line, ""));
    let Some(weekday) = parse_weekday(day) else {
        warn!("skipping opening-hours entry with unknown weekday: {line:?}");
        return None;
    };
    let Some((open, close)) = rest.split_once('-') else {
        warn!("skipping opening-hours entry without a range: {line:?}");
        return None;
    };
    // Anything after a second '-' is ignored.
    let close = close.split('-').next().unwrap_or_default();
    Some((weekday, hours_entry(open, close, line)))
}

/// Later entries for the same weekday replace earlier ones.
pub fn parse_lines<S: AsRef<str>>(lines: &[S]) -> ParsedWeek {
    let mut week = ParsedWeek::default();
    for line in lines {
        if let Some((day, entry)) = parse_line(line.as_ref()) {
            week.set(day, entry);
        }
    }
    week
}

pub fn parse_records(records: &[OpeningHours]) -> ParsedWeek {
    let mut week = ParsedWeek::default();
    for record in records {
        let Some(day) = parse_weekday(record.day.trim()) else {
            warn!("skipping opening-hours record with unknown weekday: {record:?}");
            continue;
        };
        if record.open.trim().is_empty() || record.close.trim().is_empty() {
            warn!("skipping opening-hours record without hours for {}", weekday_name(day));
            continue;
        }
        let source = format!("{} {}-{}", record.day, record.open, record.close);
        week.set(day, hours_entry(&record.open, &record.close, &source));
    }
    week
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(start_hour: u8, end_hour: u8) -> DayEntry {
        DayEntry::Open(DayHours { start_hour, end_hour })
    }

    #[test]
    fn twelve_hour_conversion() {
        assert_eq!(parse_hour("12am"), Some(0));
        assert_eq!(parse_hour("12pm"), Some(12));
        assert_eq!(parse_hour("1am"), Some(1));
        assert_eq!(parse_hour("6pm"), Some(18));
        assert_eq!(parse_hour("11PM"), Some(23));
        assert_eq!(parse_hour("06am"), Some(6));
        assert_eq!(parse_hour("13pm"), None);
        assert_eq!(parse_hour("0am"), None);
        assert_eq!(parse_hour("6"), None);
        assert_eq!(parse_hour("am"), None);
        assert_eq!(parse_hour("six pm"), None);
    }

    #[test]
    fn parses_full_week_of_lines() {
        let lines = [
            "Sunday 6am-10pm",
            "Monday 6am-10pm",
            "Tuesday 7am-9pm",
            "Wednesday 6am-10pm",
            "Thursday 6am-10pm",
            "Friday 6am-10pm",
            "Saturday 8am-12pm",
        ];
        let schedule = WeeklySchedule::from_lines(&lines);
        assert_eq!(schedule.get(Weekday::Tue), Some(DayHours { start_hour: 7, end_hour: 21 }));
        assert_eq!(schedule.get(Weekday::Sat), Some(DayHours { start_hour: 8, end_hour: 12 }));
        assert_eq!(schedule.get(Weekday::Mon).unwrap().slot_count(), 16);
    }

    #[test]
    fn spaced_range_is_accepted() {
        assert_eq!(parse_line("monday 6am - 10pm"), Some((Weekday::Mon, open(6, 22))));
    }

    #[test]
    fn bad_weekday_is_dropped() {
        assert_eq!(parse_line("Funday 6am-10pm"), None);
        let schedule = WeeklySchedule::from_lines(&["Funday 6am-10pm", "monday 6am-10pm"]);
        assert_eq!(schedule.labels().len(), 1);
    }

    #[test]
    fn missing_separator_is_dropped() {
        assert_eq!(parse_line("monday 6am 10pm"), None);
        let schedule = WeeklySchedule::from_lines(&["monday 6am 10pm"]);
        assert_eq!(schedule.get(Weekday::Mon), None);
    }

    #[test]
    fn bad_time_is_unparseable_not_error() {
        let week = parse_lines(&["monday 6xx-10pm", "tuesday 6am-10pm"]);
        assert_eq!(week.entry(Weekday::Mon), DayEntry::Unparseable);
        assert_eq!(week.entry(Weekday::Tue), open(6, 22));
        assert_eq!(week.entry(Weekday::Wed), DayEntry::Closed);

        // Unparseable and Closed look the same once collapsed.
        let schedule = week.schedule();
        assert_eq!(schedule.get(Weekday::Mon), None);
        assert_eq!(schedule.get(Weekday::Wed), None);
    }

    #[test]
    fn later_entry_wins() {
        let week = parse_lines(&["monday 6am-10pm", "monday 8am-10pm"]);
        assert_eq!(week.entry(Weekday::Mon), open(8, 22));
        let week = parse_lines(&["monday 6am-10pm", "monday 8xx-10pm"]);
        assert_eq!(week.entry(Weekday::Mon), DayEntry::Unparseable);
    }

    #[test]
    fn records_parse_like_lines() {
        let records: Vec<OpeningHours> = serde_json::from_str(
            r#"[
                {"day": "Monday", "open": "8am", "close": "10pm"},
                {"day": "Tuesday", "open": "6AM", "close": "10PM"},
                {"day": "Caturday", "open": "6am", "close": "10pm"},
                {"day": "Wednesday", "open": "", "close": "10pm"},
                {"day": "Thursday", "open": "6", "close": "10pm"}
            ]"#,
        )
        .unwrap();
        let week = parse_records(&records);
        assert_eq!(week.entry(Weekday::Mon), open(8, 22));
        assert_eq!(week.entry(Weekday::Tue), open(6, 22));
        assert_eq!(week.entry(Weekday::Wed), DayEntry::Closed);
        assert_eq!(week.entry(Weekday::Thu), DayEntry::Unparseable);
    }

    #[test]
    fn labels_render_24h() {
        let schedule = WeeklySchedule::from_lines(&["friday 6am-10pm"]);
        let json = serde_json::to_value(schedule.labels()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"friday": {"startHour": "06:00", "endHour": "22:00"}})
        );
    }

    #[test]
    fn inverted_hours_generate_nothing() {
        let hours = DayHours { start_hour: 18, end_hour: 2 };
        assert_eq!(hours.slot_count(), 0);
        let midnight_close = WeeklySchedule::from_lines(&["monday 6pm-12am"]);
        assert_eq!(midnight_close.get(Weekday::Mon).unwrap().slot_count(), 0);
    }
}
