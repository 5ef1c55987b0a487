use chrono::NaiveDate;
use ulid::Ulid;

use crate::calendar::{local_hour, local_today};
use crate::model::*;

use super::{Engine, EngineError, SharedCourtState};

fn sport_matches(court: &CourtInfo, sport: &str) -> bool {
    court.sport.eq_ignore_ascii_case(sport.trim())
}

impl Engine {
    /// Courts of `venue_id` playing `sport`, in creation order.
    pub(super) async fn courts_for_sport(
        &self,
        venue_id: Ulid,
        sport: &str,
    ) -> Result<Vec<SharedCourtState>, EngineError> {
        let venue = self.venue(&venue_id)?;
        let mut matching = Vec::new();
        for court_id in &venue.courts {
            let Some(rs) = self.get_court(court_id) else { continue };
            if sport_matches(&rs.read().await.info, sport) {
                matching.push(rs);
            }
        }
        if matching.is_empty() {
            return Err(EngineError::NoCourtsForSport {
                venue_id,
                sport: sport.to_string(),
            });
        }
        Ok(matching)
    }

    /// The court, provided it belongs to the venue and plays the sport.
    pub(super) async fn court_in_venue(
        &self,
        venue_id: Ulid,
        court_id: Ulid,
        sport: &str,
    ) -> Result<SharedCourtState, EngineError> {
        self.venue(&venue_id)?;
        let rs = self
            .get_court(&court_id)
            .ok_or(EngineError::CourtNotInVenue { court_id, venue_id })?;
        {
            let guard = rs.read().await;
            if guard.info.venue_id != venue_id || !sport_matches(&guard.info, sport) {
                return Err(EngineError::CourtNotInVenue { court_id, venue_id });
            }
        }
        Ok(rs)
    }

    /// Every row on `date` for every court of the venue playing `sport`,
    /// booked or not. Courts in creation order, hours ascending.
    pub async fn venue_availability(
        &self,
        venue_id: Ulid,
        sport: &str,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, EngineError> {
        let courts = self.courts_for_sport(venue_id, sport).await?;
        let mut rows = Vec::new();
        for rs in courts {
            rows.extend(rs.read().await.rows_on(date));
        }
        Ok(rows)
    }

    /// One court's rows on `date`, booked or not. No same-day cutoff.
    pub async fn query_availability_for_manager(
        &self,
        venue_id: Ulid,
        court_id: Ulid,
        sport: &str,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, EngineError> {
        let rs = self.court_in_venue(venue_id, court_id, sport).await?;
        let rows = rs.read().await.rows_on(date);
        Ok(rows)
    }

    /// One court's rows on `date` as an end user sees them: on the local
    /// today only hours starting after the current local hour.
    pub async fn query_availability(
        &self,
        venue_id: Ulid,
        court_id: Ulid,
        sport: &str,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, EngineError> {
        let rs = self.court_in_venue(venue_id, court_id, sport).await?;
        let now = self.clock.now();
        let mut rows = rs.read().await.rows_on(date);
        if date == local_today(now, self.offset) {
            let hour = local_hour(now, self.offset);
            rows.retain(|slot| slot.start_time > hour);
        }
        rows.sort_by_key(|slot| slot.start_time);
        Ok(rows)
    }
}
