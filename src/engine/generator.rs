use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info};
use ulid::Ulid;

use crate::calendar::{date_weekday_name, local_today};
use crate::model::*;
use crate::schedule::{DayHours, WeeklySchedule};

use super::{Engine, EngineError};

/// One free slot per open hour for `days` days from `start`. Closed weekdays yield nothing.
pub fn generate_slots(schedule: &WeeklySchedule, start: NaiveDate, days: u32) -> Vec<SlotKey> {
    let mut slots = Vec::new();
    for date in start.iter_days().take(days as usize) {
        match schedule.for_date(date) {
            Some(hours) => slots.extend(hours.hours().map(|h| SlotKey::new(date, h))),
            None => debug!("venue closed on {}, skipping {date}", date_weekday_name(date)),
        }
    }
    slots
}

/// Slots for one day under new hours, leaving out hours a booking or block still holds.
pub fn regenerate_day(date: NaiveDate, hours: DayHours, taken: &BTreeSet<u8>) -> Vec<SlotKey> {
    hours
        .hours()
        .filter(|h| !taken.contains(h))
        .map(|h| SlotKey::new(date, h))
        .collect()
}

/// Outcome of a generation call. Zero slots is a valid result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationReport {
    pub slots_created: usize,
    pub first_day: NaiveDate,
    pub days: u32,
}

impl Engine {
    /// Generate a full window for a court, starting the day after its latest row
    /// (or today when it has none). Written as one batch.
    pub async fn generate_initial_availability(
        &self,
        venue_id: Ulid,
        court_id: Ulid,
        schedule: &WeeklySchedule,
    ) -> Result<GenerationReport, EngineError> {
        self.generate_days(venue_id, court_id, schedule, self.window_days).await
    }

    pub(super) async fn generate_days(
        &self,
        venue_id: Ulid,
        court_id: Ulid,
        schedule: &WeeklySchedule,
        days: u32,
    ) -> Result<GenerationReport, EngineError> {
        let rs = self.get_court(&court_id).ok_or(EngineError::NotFound(court_id))?;
        let mut guard = rs.write().await;
        if guard.info.venue_id != venue_id {
            return Err(EngineError::CourtNotInVenue { court_id, venue_id });
        }

        let today = local_today(self.clock.now(), self.offset);
        let first_day = guard.latest_date().map_or(today, |d| d + Duration::days(1));
        let slots = generate_slots(schedule, first_day, days);
        let slots_created = slots.len();
        let report = GenerationReport { slots_created, first_day, days };
        if slots_created == 0 {
            info!("no availability generated for court {court_id}: closed for {days} day(s) from {first_day}");
            return Ok(report);
        }

        let through = first_day + Duration::days(i64::from(days) - 1);
        let event = Event::SlotsGenerated { court_id, through, slots };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::SLOTS_GENERATED_TOTAL).increment(slots_created as u64);
        info!("generated {slots_created} slot(s) for court {court_id} over {days} day(s) from {first_day}");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn every_day_open_gives_sixteen_per_day() {
        let lines: Vec<String> = crate::calendar::WEEKDAY_NAMES
            .iter()
            .map(|d| format!("{d} 6am-10pm"))
            .collect();
        let schedule = WeeklySchedule::from_lines(&lines);
        let slots = generate_slots(&schedule, ymd(2024, 6, 1), 7);
        assert_eq!(slots.len(), 112);
        assert_eq!(slots.first(), Some(&SlotKey::new(ymd(2024, 6, 1), 6)));
        assert_eq!(slots.last(), Some(&SlotKey::new(ymd(2024, 6, 7), 21)));
    }

    #[test]
    fn closed_weekdays_are_skipped() {
        // Only Mondays; 2024-06-01 is a Saturday, so the Monday is June 3.
        let schedule = WeeklySchedule::from_lines(&["monday 8am-10am"]);
        assert_eq!(schedule.get(Weekday::Mon).unwrap().slot_count(), 2);
        let slots = generate_slots(&schedule, ymd(2024, 6, 1), 7);
        assert_eq!(
            slots,
            vec![SlotKey::new(ymd(2024, 6, 3), 8), SlotKey::new(ymd(2024, 6, 3), 9)]
        );
    }

    #[test]
    fn closed_all_week_is_empty() {
        let slots = generate_slots(&WeeklySchedule::default(), ymd(2024, 6, 1), 7);
        assert!(slots.is_empty());
    }

    #[test]
    fn regenerate_skips_taken_hours() {
        let taken: BTreeSet<u8> = [9, 10].into_iter().collect();
        let hours = DayHours { start_hour: 8, end_hour: 12 };
        let slots = regenerate_day(ymd(2024, 6, 3), hours, &taken);
        let got: Vec<u8> = slots.iter().map(|k| k.hour).collect();
        assert_eq!(got, vec![8, 11]);
    }
}
