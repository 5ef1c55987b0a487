use chrono::Duration;
use tracing::{info, warn};
use ulid::Ulid;

use crate::calendar::local_today;
use crate::model::*;
use crate::observability;

use super::generator::generate_slots;
use super::{Engine, EngineError};

/// Outcome of one daily roll across all courts.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RollReport {
    pub rolled: usize,
    pub slots_created: usize,
    pub failed: Vec<(Ulid, String)>,
}

impl Engine {
    /// Drop each court's oldest day and generate one new day at the far end.
    /// A failing court is reported and skipped; the others still roll.
    pub async fn roll_availability_window(&self) -> RollReport {
        let mut report = RollReport::default();
        let mut court_ids = self.court_ids();
        court_ids.sort();

        for court_id in court_ids {
            match self.roll_court(court_id).await {
                Ok(created) => {
                    report.rolled += 1;
                    report.slots_created += created;
                }
                Err(e) => {
                    warn!("window roll failed for court {court_id}: {e}");
                    metrics::counter!(observability::COURT_JOB_FAILURES_TOTAL, "job" => "roll").increment(1);
                    report.failed.push((court_id, e.to_string()));
                }
            }
        }

        metrics::counter!(observability::WINDOW_ROLLS_TOTAL).increment(1);
        info!(
            "window roll: {} court(s) rolled, {} slot(s) created, {} failed",
            report.rolled,
            report.slots_created,
            report.failed.len()
        );
        report
    }

    async fn roll_court(&self, court_id: Ulid) -> Result<usize, EngineError> {
        let rs = self.get_court(&court_id).ok_or(EngineError::NotFound(court_id))?;
        let mut guard = rs.write().await;
        let schedule = self.venue(&guard.info.venue_id)?.schedule;

        let dropped = guard.oldest_date();
        // A closed last day leaves no rows but still counts as generated.
        let last = match (guard.latest_date(), guard.generated_through) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let next = last.map_or_else(
            || local_today(self.clock.now(), self.offset),
            |d| d + Duration::days(1),
        );
        let slots = generate_slots(&schedule, next, 1);
        let created = slots.len();

        let event = Event::WindowRolled {
            court_id,
            dropped,
            through: next,
            slots,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::SLOTS_GENERATED_TOTAL).increment(created as u64);
        Ok(created)
    }
}
