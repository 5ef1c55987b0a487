use chrono::Duration;
use tracing::{info, warn};
use ulid::Ulid;

use crate::calendar::local_today;
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::schedule::WeeklySchedule;

use super::{generate_slots, CourtState, Engine, EngineError, GenerationReport};

fn validate_sport(sport: &str) -> Result<(), EngineError> {
    if sport.trim().is_empty() {
        return Err(EngineError::Validation("sport name is required"));
    }
    if sport.len() > MAX_SPORT_NAME_LEN {
        return Err(EngineError::LimitExceeded("sport name too long"));
    }
    Ok(())
}

impl Engine {
    /// Add a venue in `Pending` with the given weekly hours.
    pub async fn register_venue(
        &self,
        id: Ulid,
        owner_id: Ulid,
        sports: Vec<String>,
        schedule: WeeklySchedule,
        loyalty: LoyaltySettings,
    ) -> Result<VenueInfo, EngineError> {
        if sports.len() > MAX_SPORTS_PER_VENUE {
            return Err(EngineError::LimitExceeded("too many sports"));
        }
        for sport in &sports {
            validate_sport(sport)?;
        }
        if self.venues.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if schedule.is_closed_every_day() {
            warn!("venue {id} registered with no opening hours");
        }

        let venue = VenueInfo {
            id,
            owner_id,
            status: VenueStatus::Pending,
            sports,
            loyalty,
            schedule,
            courts: Vec::new(),
        };
        self.persist_structural(id, &Event::VenueRegistered { venue: venue.clone() })
            .await?;
        info!("venue {id} registered");
        Ok(venue)
    }

    /// Approve or decline a venue. Nothing goes back to `Pending`.
    pub async fn set_venue_status(&self, id: Ulid, status: VenueStatus) -> Result<(), EngineError> {
        if status == VenueStatus::Pending {
            return Err(EngineError::Validation("venue cannot return to pending"));
        }
        self.venue(&id)?;
        self.persist_structural(id, &Event::VenueStatusChanged { id, status })
            .await
    }

    /// Attach a court to a venue with its first window generated from the
    /// venue's stored hours. Court and slots go into a single WAL record, so a
    /// failed write registers neither.
    pub async fn add_court(
        &self,
        id: Ulid,
        venue_id: Ulid,
        sport: &str,
        price_per_hour: u64,
        status: CourtStatus,
    ) -> Result<GenerationReport, EngineError> {
        validate_sport(sport)?;
        let venue = self.venue(&venue_id)?;
        if venue.courts.len() >= MAX_COURTS_PER_VENUE {
            return Err(EngineError::LimitExceeded("too many courts for venue"));
        }
        if self.courts.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if !venue.sports.iter().any(|s| s.eq_ignore_ascii_case(sport)) {
            warn!("court {id} plays {sport:?}, which venue {venue_id} does not list");
        }

        let court = CourtInfo {
            id,
            venue_id,
            sport: sport.to_string(),
            price_per_hour,
            status,
        };
        let first_day = local_today(self.clock.now(), self.offset);
        let days = self.window_days;
        let slots = generate_slots(&venue.schedule, first_day, days);
        let report = GenerationReport {
            slots_created: slots.len(),
            first_day,
            days,
        };
        let through = (!slots.is_empty()).then(|| first_day + Duration::days(i64::from(days) - 1));
        self.persist_structural(venue_id, &Event::CourtAdded { court, through, slots })
            .await?;
        metrics::counter!(observability::SLOTS_GENERATED_TOTAL).increment(report.slots_created as u64);
        info!(
            "court {id} added to venue {venue_id} with {} slot(s) from {first_day}",
            report.slots_created
        );
        Ok(report)
    }

    /// Detach a court, dropping its slots and bookings with it.
    pub async fn remove_court(&self, venue_id: Ulid, court_id: Ulid) -> Result<(), EngineError> {
        let rs = self.get_court(&court_id).ok_or(EngineError::NotFound(court_id))?;
        let guard = rs.write().await;
        if guard.info.venue_id != venue_id {
            return Err(EngineError::CourtNotInVenue { court_id, venue_id });
        }
        let dropped = guard.bookings().count();
        self.persist_structural(venue_id, &Event::CourtRemoved { id: court_id, venue_id })
            .await?;
        info!("court {court_id} removed from venue {venue_id} with {dropped} booking(s)");
        Ok(())
    }

    /// Read-only copy of a court's state.
    pub async fn court(&self, court_id: Ulid) -> Result<CourtState, EngineError> {
        let rs = self.get_court(&court_id).ok_or(EngineError::NotFound(court_id))?;
        let guard = rs.read().await;
        Ok(guard.clone())
    }
}
