use chrono::NaiveDate;
use ulid::Ulid;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Unauthorized,
    Storage,
}

#[derive(Debug)]
pub enum EngineError {
    Validation(&'static str),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The venue offers no court for this sport.
    NoCourtsForSport { venue_id: Ulid, sport: String },
    /// The court does not belong to the venue, or plays a different sport.
    CourtNotInVenue { court_id: Ulid, venue_id: Ulid },
    /// No free slot left on that date: closed, fully booked or not yet generated.
    VenueClosed { court_id: Ulid, date: NaiveDate },
    ExceedsAvailableTime { requested_end: u8, closes_at: u8 },
    SlotTaken { date: NaiveDate, hour: u8 },
    Unauthorized(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::NotFound(_)
            | EngineError::NoCourtsForSport { .. }
            | EngineError::CourtNotInVenue { .. } => ErrorKind::NotFound,
            EngineError::AlreadyExists(_)
            | EngineError::VenueClosed { .. }
            | EngineError::ExceedsAvailableTime { .. }
            | EngineError::SlotTaken { .. } => ErrorKind::Conflict,
            EngineError::Unauthorized(_) => ErrorKind::Unauthorized,
            EngineError::WalError(_) => ErrorKind::Storage,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::NoCourtsForSport { venue_id, sport } => {
                write!(f, "no courts found with sport {sport:?} at venue {venue_id}")
            }
            EngineError::CourtNotInVenue { court_id, venue_id } => {
                write!(f, "court {court_id} not found for the selected sport in venue {venue_id}")
            }
            EngineError::VenueClosed { court_id, date } => {
                write!(f, "no availability found for court {court_id} on {date}")
            }
            EngineError::ExceedsAvailableTime { requested_end, closes_at } => write!(
                f,
                "booking duration exceeds available time: ends at {requested_end}:00, last slot ends at {closes_at}:00"
            ),
            EngineError::SlotTaken { date, hour } => {
                write!(f, "slot {hour}:00 on {date} is already booked")
            }
            EngineError::Unauthorized(user) => write!(f, "user {user} is not authorized"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
