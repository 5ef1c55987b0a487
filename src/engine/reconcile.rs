use chrono::NaiveDate;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::calendar::{date_weekday_name, local_today};
use crate::model::*;
use crate::observability;
use crate::schedule::{OpeningHours, WeeklySchedule};

use super::generator::regenerate_day;
use super::{CourtState, Engine, EngineError};

/// Outcome of an opening-hours edit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Lowercase weekday names of the changed days, in date order.
    pub days_changed: Vec<String>,
    pub dates_changed: Vec<NaiveDate>,
    pub failed: Vec<(Ulid, String)>,
}

/// Does `date` need regenerating on `reference` under `schedule`?
///
/// Changed when the new hours differ from the rows' first start/last end,
/// or when an open day has no rows yet. A day the schedule leaves closed is
/// never changed: its existing rows stay bookable.
fn day_changed(reference: &CourtState, schedule: &WeeklySchedule, date: NaiveDate) -> bool {
    let existing = reference.bounds_on(date);
    let wanted = schedule
        .for_date(date)
        .filter(|h| h.slot_count() > 0)
        .map(|h| (h.start_hour, h.end_hour));
    match (existing, wanted) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(have), Some(want)) => have != want,
    }
}

impl Engine {
    /// Manager edits opening hours: parse the records, then reconcile.
    pub async fn update_venue_hours(
        &self,
        venue_id: Ulid,
        manager_id: Ulid,
        hours: &[OpeningHours],
    ) -> Result<ReconcileReport, EngineError> {
        let venue = self.venue(&venue_id)?;
        if venue.owner_id != manager_id {
            return Err(EngineError::Unauthorized(manager_id));
        }
        self.reconcile_schedule_change(venue_id, &WeeklySchedule::from_records(hours))
            .await
    }

    /// Store the new schedule and regenerate only the days whose hours changed.
    ///
    /// Changed days are detected on the venue's first court and applied to
    /// every court. Only free rows are replaced; booked and blocked rows
    /// survive untouched, even outside the new hours.
    pub async fn reconcile_schedule_change(
        &self,
        venue_id: Ulid,
        schedule: &WeeklySchedule,
    ) -> Result<ReconcileReport, EngineError> {
        let venue = self.venue(&venue_id)?;
        let today = local_today(self.clock.now(), self.offset);
        let window: Vec<NaiveDate> = today.iter_days().take(self.window_days as usize).collect();

        let mut report = ReconcileReport::default();
        if let Some(reference) = venue.courts.first().and_then(|id| self.get_court(id)) {
            let guard = reference.read().await;
            report.dates_changed = window
                .iter()
                .copied()
                .filter(|d| day_changed(&guard, schedule, *d))
                .collect();
        } else {
            debug!("venue {venue_id} has no courts, storing schedule only");
        }
        report.days_changed = report
            .dates_changed
            .iter()
            .map(|d| date_weekday_name(*d).to_string())
            .collect();

        self.persist_structural(
            venue_id,
            &Event::VenueScheduleChanged {
                id: venue_id,
                schedule: *schedule,
            },
        )
        .await?;

        if report.dates_changed.is_empty() {
            info!("schedule of venue {venue_id} updated, no days changed");
            return Ok(report);
        }

        for court_id in &venue.courts {
            if let Err(e) = self
                .regenerate_court_days(*court_id, schedule, &report.dates_changed)
                .await
            {
                warn!("reconcile failed for court {court_id}: {e}");
                metrics::counter!(observability::COURT_JOB_FAILURES_TOTAL, "job" => "reconcile").increment(1);
                report.failed.push((*court_id, e.to_string()));
            }
        }

        metrics::counter!(observability::RECONCILE_DAYS_CHANGED_TOTAL)
            .increment(report.dates_changed.len() as u64);
        info!(
            "schedule of venue {venue_id} updated, changed: {}",
            report.days_changed.join(", ")
        );
        Ok(report)
    }

    async fn regenerate_court_days(
        &self,
        court_id: Ulid,
        schedule: &WeeklySchedule,
        dates: &[NaiveDate],
    ) -> Result<(), EngineError> {
        let rs = self.get_court(&court_id).ok_or(EngineError::NotFound(court_id))?;
        let mut guard = rs.write().await;

        let mut slots = Vec::new();
        for date in dates {
            if let Some(hours) = schedule.for_date(*date) {
                slots.extend(regenerate_day(*date, hours, &guard.unavailable_hours(*date)));
            }
        }
        let created = slots.len();
        let event = Event::DaysRegenerated {
            court_id,
            dates: dates.to_vec(),
            slots,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::SLOTS_GENERATED_TOTAL).increment(created as u64);

        // Hours new to a tournament day come out free; put the block back over them.
        let blocked_days: Vec<NaiveDate> = self
            .tournaments
            .iter()
            .filter(|t| t.court_id == court_id)
            .flat_map(|t| {
                let (from, to) = (t.game_day, t.game_end_day);
                dates.iter().copied().filter(move |d| (from..=to).contains(d))
            })
            .collect();
        for date in blocked_days {
            let event = Event::CourtBlocked {
                court_id,
                from: date,
                to: date,
            };
            self.persist_and_apply(&mut guard, &event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn court() -> CourtState {
        CourtState::new(CourtInfo {
            id: Ulid::new(),
            venue_id: Ulid::new(),
            sport: "futsal".into(),
            price_per_hour: 1000,
            status: CourtStatus::Available,
        })
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn next_day(date: NaiveDate) -> NaiveDate {
        date.succ_opt().unwrap()
    }

    #[test]
    fn changed_day_detection() {
        let mut cs = court();
        let monday = ymd(2024, 6, 3);
        let tuesday = next_day(monday);
        let court_id = cs.info.id;
        cs.apply(&Event::SlotsGenerated {
            court_id,
            through: tuesday,
            slots: [monday, tuesday]
                .iter()
                .flat_map(|d| (6..22).map(|h| SlotKey::new(*d, h)))
                .collect(),
        });

        let schedule = WeeklySchedule::from_lines(&["monday 8am-10pm", "tuesday 6am-10pm"]);
        assert!(day_changed(&cs, &schedule, monday));
        assert!(!day_changed(&cs, &schedule, tuesday));
        // Wednesday: no rows, still closed.
        assert!(!day_changed(&cs, &schedule, next_day(tuesday)));

        let closes_tuesday = WeeklySchedule::from_lines(&["monday 6am-10pm"]);
        assert!(!day_changed(&cs, &closes_tuesday, tuesday));
    }
}
