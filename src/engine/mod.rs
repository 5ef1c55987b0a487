mod booking;
mod error;
mod generator;
mod queries;
mod reconcile;
mod registry;
mod roller;
mod store;
mod tournament;

pub use booking::AdvanceReport;
pub use error::{EngineError, ErrorKind};
pub use generator::{generate_slots, regenerate_day, GenerationReport};
pub use reconcile::ReconcileReport;
pub use roller::RollReport;
pub use store::CourtState;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::calendar::{Clock, SystemClock};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedCourtState = Arc<RwLock<CourtState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Each wake-up takes one append, drains whatever else is
/// already queued, writes them all and fsyncs once for the batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so stray buffered bytes don't leak into the next batch.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Time convention and window width the engine runs with.
#[derive(Clone)]
pub struct EngineSettings {
    pub offset: FixedOffset,
    pub window_days: u32,
    pub clock: Arc<dyn Clock>,
}

impl EngineSettings {
    pub fn new(offset: FixedOffset, window_days: u32) -> Self {
        Self {
            offset,
            window_days,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// The availability store and every operation on it.
///
/// Each court's slots and bookings sit behind that court's own `RwLock`;
/// holding the write lock is what makes a check-then-claim atomic. Venues,
/// tournaments and the booking index are shared maps updated after the WAL
/// append succeeds.
pub struct Engine {
    pub(super) courts: DashMap<Ulid, SharedCourtState>,
    pub(super) venues: DashMap<Ulid, VenueInfo>,
    pub(super) tournaments: DashMap<Ulid, Tournament>,
    /// Reverse lookup: booking id → court id
    pub(super) booking_to_court: DashMap<Ulid, Ulid>,
    /// Serializes registry writes against compaction. Taken after any court lock.
    pub(super) structure: Mutex<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) offset: FixedOffset,
    pub(super) window_days: u32,
    pub(super) clock: Arc<dyn Clock>,
}

/// Apply a court-scoped event to a locked court and keep the booking index in step.
fn apply_to_court(cs: &mut CourtState, event: &Event, booking_index: &DashMap<Ulid, Ulid>) {
    cs.apply(event);
    match event {
        Event::BookingReserved { booking } => {
            booking_index.insert(booking.id, booking.court_id);
        }
        Event::BookingWithdrawn { id, .. } => {
            booking_index.remove(id);
        }
        _ => {}
    }
}

fn is_structural(event: &Event) -> bool {
    matches!(
        event,
        Event::VenueRegistered { .. }
            | Event::VenueStatusChanged { .. }
            | Event::VenueScheduleChanged { .. }
            | Event::CourtAdded { .. }
            | Event::CourtRemoved { .. }
            | Event::CourtRestored { .. }
            | Event::TournamentSaved { .. }
            | Event::TournamentRemoved { .. }
    )
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>, settings: EngineSettings) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            courts: DashMap::new(),
            venues: DashMap::new(),
            tournaments: DashMap::new(),
            booking_to_court: DashMap::new(),
            structure: Mutex::new(()),
            wal_tx,
            notify,
            offset: settings.offset,
            window_days: settings.window_days,
            clock: settings.clock,
        };

        // Sole owner of every Arc during replay, so try_write never contends.
        for event in &events {
            if is_structural(event) {
                engine.apply_structural(event);
            } else if let Some(court_id) = event.court_id()
                && let Some(rs) = engine.get_court(&court_id)
            {
                let mut guard = rs.try_write().expect("replay: uncontended write");
                apply_to_court(&mut guard, event, &engine.booking_to_court);
            }
        }
        metrics::gauge!(crate::observability::COURTS_ACTIVE).set(engine.courts.len() as f64);

        Ok(engine)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    /// Current instant according to the engine's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(super) fn now_ms(&self) -> Ms {
        self.clock.now().timestamp_millis()
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_court(&self, id: &Ulid) -> Option<SharedCourtState> {
        self.courts.get(id).map(|e| e.value().clone())
    }

    pub fn court_ids(&self) -> Vec<Ulid> {
        self.courts.iter().map(|e| *e.key()).collect()
    }

    pub fn venue(&self, id: &Ulid) -> Result<VenueInfo, EngineError> {
        self.venues
            .get(id)
            .map(|v| v.value().clone())
            .ok_or(EngineError::NotFound(*id))
    }

    pub fn venue_ids(&self) -> Vec<Ulid> {
        self.venues.iter().map(|e| *e.key()).collect()
    }

    pub fn get_court_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_court.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append, apply to the locked court, notify its venue.
    pub(super) async fn persist_and_apply(
        &self,
        cs: &mut CourtState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_court(cs, event, &self.booking_to_court);
        self.notify.send(cs.info.venue_id, event);
        Ok(())
    }

    /// WAL-append and apply a registry event (venues, courts, tournaments).
    pub(super) async fn persist_structural(&self, venue_id: Ulid, event: &Event) -> Result<(), EngineError> {
        let _structure = self.structure.lock().await;
        self.wal_append(event).await?;
        self.apply_structural(event);
        self.notify.send(venue_id, event);
        Ok(())
    }

    fn apply_structural(&self, event: &Event) {
        match event {
            Event::VenueRegistered { venue } => {
                self.venues.insert(venue.id, venue.clone());
            }
            Event::VenueStatusChanged { id, status } => {
                if let Some(mut v) = self.venues.get_mut(id) {
                    v.status = *status;
                }
            }
            Event::VenueScheduleChanged { id, schedule } => {
                if let Some(mut v) = self.venues.get_mut(id) {
                    v.schedule = *schedule;
                }
            }
            Event::CourtAdded { court, through, slots } => {
                let mut cs = CourtState::new(court.clone());
                if let Some(through) = through {
                    cs.add_generated(*through, slots);
                }
                self.attach_court(cs);
            }
            Event::CourtRestored { snapshot } => {
                let cs = CourtState::from_snapshot(snapshot.clone());
                for booking in cs.bookings() {
                    self.booking_to_court.insert(booking.id, booking.court_id);
                }
                self.attach_court(cs);
            }
            Event::CourtRemoved { id, venue_id } => {
                self.courts.remove(id);
                self.booking_to_court.retain(|_, court| court != id);
                if let Some(mut v) = self.venues.get_mut(venue_id) {
                    v.courts.retain(|c| c != id);
                }
            }
            Event::TournamentSaved { tournament } => {
                self.tournaments.insert(tournament.id, tournament.clone());
            }
            Event::TournamentRemoved { id } => {
                self.tournaments.remove(id);
            }
            _ => {}
        }
        metrics::gauge!(crate::observability::COURTS_ACTIVE).set(self.courts.len() as f64);
    }

    fn attach_court(&self, cs: CourtState) {
        let (id, venue_id) = (cs.info.id, cs.info.venue_id);
        self.courts.insert(id, Arc::new(RwLock::new(cs)));
        if let Some(mut v) = self.venues.get_mut(&venue_id)
            && !v.courts.contains(&id)
        {
            v.courts.push(id);
        }
    }

    /// Lookup booking → court, acquire the court's write lock, confirm the booking is still there.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<CourtState>, EngineError> {
        let court_id = self
            .get_court_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let rs = self.get_court(&court_id).ok_or(EngineError::NotFound(court_id))?;
        let guard = rs.write_owned().await;
        if guard.booking(booking_id).is_none() {
            return Err(EngineError::NotFound(*booking_id));
        }
        Ok(guard)
    }

    /// Rewrite the WAL as a snapshot of current state.
    ///
    /// Holds every court's read lock and the registry lock until the swap is
    /// done, so no append can land between snapshot and swap.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut court_ids = self.court_ids();
        court_ids.sort();
        let mut guards = Vec::with_capacity(court_ids.len());
        for id in &court_ids {
            if let Some(rs) = self.get_court(id) {
                guards.push(rs.read_owned().await);
            }
        }
        let _structure = self.structure.lock().await;

        let mut events = Vec::new();
        for entry in self.venues.iter() {
            let mut venue = entry.value().clone();
            venue.courts.clear();
            events.push(Event::VenueRegistered { venue });
        }
        for guard in &guards {
            events.push(Event::CourtRestored { snapshot: guard.snapshot() });
        }
        for entry in self.tournaments.iter() {
            events.push(Event::TournamentSaved { tournament: entry.value().clone() });
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
