use chrono::NaiveDate;
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

fn validate_range(from: NaiveDate, to: NaiveDate) -> Result<(), EngineError> {
    if from > to {
        return Err(EngineError::Validation("tournament must end on or after its first day"));
    }
    if (to - from).num_days() >= MAX_BLOCK_DAYS {
        return Err(EngineError::LimitExceeded("tournament range too long"));
    }
    Ok(())
}

fn validate_tournament(t: &Tournament) -> Result<(), EngineError> {
    if t.name.trim().is_empty() {
        return Err(EngineError::Validation("tournament name is required"));
    }
    if t.name.len() > MAX_TOURNAMENT_NAME_LEN {
        return Err(EngineError::LimitExceeded("tournament name too long"));
    }
    if t.total_teams == 0 {
        return Err(EngineError::Validation("tournament needs at least one team"));
    }
    validate_range(t.game_day, t.game_end_day)
}

impl Engine {
    /// Mark every free hour of the court unavailable over `[from, to]`.
    /// Booked hours keep their booking.
    pub async fn block_for_tournament(
        &self,
        venue_id: Ulid,
        court_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<(), EngineError> {
        validate_range(from, to)?;
        self.flip_range(venue_id, Event::CourtBlocked { court_id, from, to })
            .await
    }

    /// Inverse of [`Engine::block_for_tournament`]: blocked hours go back to free.
    pub async fn unblock_for_tournament(
        &self,
        venue_id: Ulid,
        court_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<(), EngineError> {
        validate_range(from, to)?;
        self.flip_range(venue_id, Event::CourtUnblocked { court_id, from, to })
            .await
    }

    async fn flip_range(&self, venue_id: Ulid, event: Event) -> Result<(), EngineError> {
        let court_id = event.court_id().ok_or(EngineError::Validation("court required"))?;
        self.venue(&venue_id)?;
        let rs = self.get_court(&court_id).ok_or(EngineError::NotFound(court_id))?;
        let mut guard = rs.write().await;
        if guard.info.venue_id != venue_id {
            return Err(EngineError::CourtNotInVenue { court_id, venue_id });
        }
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Manager override of one row on a court of their own venue. Only free and
    /// blocked rows can be flipped; a booked row is a conflict.
    pub async fn set_slot_availability(
        &self,
        venue_id: Ulid,
        manager_id: Ulid,
        court_id: Ulid,
        date: NaiveDate,
        hour: u8,
        available: bool,
    ) -> Result<Slot, EngineError> {
        self.owned_venue(venue_id, manager_id)?;
        let rs = self.get_court(&court_id).ok_or(EngineError::NotFound(court_id))?;
        let mut guard = rs.write().await;
        if guard.info.venue_id != venue_id {
            return Err(EngineError::CourtNotInVenue { court_id, venue_id });
        }
        match guard.state_at(date, hour) {
            None => return Err(EngineError::Validation("no slot at that hour")),
            Some(SlotState::Booked(_)) => return Err(EngineError::SlotTaken { date, hour }),
            Some(state) if state.is_available() != available => {
                let key = SlotKey::new(date, hour);
                self.persist_and_apply(&mut guard, &Event::SlotOverridden { court_id, key, available })
                    .await?;
                info!("slot {date} {hour}:00 on court {court_id} set available={available} by manager");
            }
            Some(_) => {}
        }
        guard
            .rows_on(date)
            .into_iter()
            .find(|s| s.start_time == hour)
            .ok_or(EngineError::Validation("no slot at that hour"))
    }

    fn owned_venue(&self, venue_id: Ulid, manager_id: Ulid) -> Result<VenueInfo, EngineError> {
        let venue = self.venue(&venue_id)?;
        if venue.owner_id != manager_id {
            return Err(EngineError::Unauthorized(manager_id));
        }
        Ok(venue)
    }

    pub fn tournament(&self, id: &Ulid) -> Result<Tournament, EngineError> {
        self.tournaments
            .get(id)
            .map(|t| t.value().clone())
            .ok_or(EngineError::NotFound(*id))
    }

    /// A venue's tournaments, earliest game day first.
    pub fn tournaments_for_venue(&self, venue_id: Ulid) -> Vec<Tournament> {
        let mut out: Vec<Tournament> = self
            .tournaments
            .iter()
            .filter(|t| t.venue_id == venue_id)
            .map(|t| t.value().clone())
            .collect();
        out.sort_by_key(|t| (t.game_day, t.id));
        out
    }

    /// Register a tournament and block its court for the game days.
    pub async fn create_tournament(&self, manager_id: Ulid, tournament: Tournament) -> Result<Tournament, EngineError> {
        validate_tournament(&tournament)?;
        let venue = self.owned_venue(tournament.venue_id, manager_id)?;
        if self.tournaments.contains_key(&tournament.id) {
            return Err(EngineError::AlreadyExists(tournament.id));
        }
        if !venue.courts.contains(&tournament.court_id) {
            return Err(EngineError::CourtNotInVenue {
                court_id: tournament.court_id,
                venue_id: venue.id,
            });
        }

        let (venue_id, court_id) = (tournament.venue_id, tournament.court_id);
        let (from, to) = (tournament.game_day, tournament.game_end_day);
        self.block_for_tournament(venue_id, court_id, from, to).await?;
        let saved = Event::TournamentSaved { tournament: tournament.clone() };
        if let Err(e) = self.persist_structural(venue_id, &saved).await {
            if let Err(undo) = self.unblock_for_tournament(venue_id, court_id, from, to).await {
                warn!("tournament {} left court {court_id} blocked: {undo}", tournament.id);
            }
            return Err(e);
        }
        info!("tournament {} blocks court {court_id} {from}..={to}", tournament.id);
        Ok(tournament)
    }

    /// Apply `update`, moving the block: the old range is released in full
    /// before the new range (or new court) is blocked. If the move cannot be
    /// completed the old range is blocked again and the stored tournament
    /// is left as it was.
    pub async fn update_tournament(
        &self,
        manager_id: Ulid,
        id: Ulid,
        update: TournamentUpdate,
    ) -> Result<Tournament, EngineError> {
        let old = self.tournament(&id)?;
        let venue = self.owned_venue(old.venue_id, manager_id)?;

        let mut new = old.clone();
        if let Some(court_id) = update.court_id {
            new.court_id = court_id;
        }
        if let Some(sport_id) = update.sport_id {
            new.sport_id = sport_id;
        }
        if let Some(name) = update.name {
            new.name = name;
        }
        if let Some(day) = update.game_day {
            new.game_day = day;
        }
        if let Some(day) = update.game_end_day {
            new.game_end_day = day;
        }
        if let Some(deadline) = update.register_ends {
            new.register_ends = deadline;
        }
        if let Some(teams) = update.total_teams {
            new.total_teams = teams;
        }
        validate_tournament(&new)?;
        if !venue.courts.contains(&new.court_id) {
            return Err(EngineError::CourtNotInVenue {
                court_id: new.court_id,
                venue_id: venue.id,
            });
        }

        self.unblock_for_tournament(old.venue_id, old.court_id, old.game_day, old.game_end_day)
            .await?;
        if let Err(e) = self
            .block_for_tournament(new.venue_id, new.court_id, new.game_day, new.game_end_day)
            .await
        {
            self.restore_block(&old).await;
            return Err(e);
        }
        if let Err(e) = self
            .persist_structural(new.venue_id, &Event::TournamentSaved { tournament: new.clone() })
            .await
        {
            if let Err(undo) = self
                .unblock_for_tournament(new.venue_id, new.court_id, new.game_day, new.game_end_day)
                .await
            {
                warn!("tournament {id} left court {} blocked: {undo}", new.court_id);
            }
            self.restore_block(&old).await;
            return Err(e);
        }
        info!(
            "tournament {id} moved to court {} {}..={}",
            new.court_id, new.game_day, new.game_end_day
        );
        Ok(new)
    }

    /// Drop the tournament and release its whole range.
    pub async fn delete_tournament(&self, manager_id: Ulid, id: Ulid) -> Result<(), EngineError> {
        let old = self.tournament(&id)?;
        self.owned_venue(old.venue_id, manager_id)?;
        self.unblock_for_tournament(old.venue_id, old.court_id, old.game_day, old.game_end_day)
            .await?;
        if let Err(e) = self
            .persist_structural(old.venue_id, &Event::TournamentRemoved { id })
            .await
        {
            self.restore_block(&old).await;
            return Err(e);
        }
        info!("tournament {id} deleted, court {} released", old.court_id);
        Ok(())
    }

    /// Put a stored tournament's block back after a failed move or delete.
    async fn restore_block(&self, t: &Tournament) {
        if let Err(e) = self
            .block_for_tournament(t.venue_id, t.court_id, t.game_day, t.game_end_day)
            .await
        {
            warn!("tournament {} left court {} unblocked: {e}", t.id, t.court_id);
        }
    }
}
