use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::schedule::WeeklySchedule;

/// Unix milliseconds.
pub type Ms = i64;

// ── Venue & court ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VenueStatus {
    Pending,
    Approved,
    Declined,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltySettings {
    pub enabled: bool,
    pub points_to_redeem: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueInfo {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub status: VenueStatus,
    pub sports: Vec<String>,
    pub loyalty: LoyaltySettings,
    pub schedule: WeeklySchedule,
    /// Courts in creation order. The first is the reconciliation reference court.
    pub courts: Vec<Ulid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourtStatus {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourtInfo {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub sport: String,
    pub price_per_hour: u64,
    pub status: CourtStatus,
}

// ── Slots ────────────────────────────────────────────────────────

/// One hour of one court on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub hour: u8,
}

impl SlotKey {
    pub fn new(date: NaiveDate, hour: u8) -> Self {
        Self { date, hour }
    }
}

/// Who, if anyone, holds a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    Free,
    /// Held by a booking.
    Booked(Ulid),
    /// Not bookable, with no owning booking (tournament block).
    Blocked,
}

impl SlotState {
    pub fn is_available(&self) -> bool {
        matches!(self, SlotState::Free)
    }

    pub fn booking_id(&self) -> Option<Ulid> {
        match self {
            SlotState::Booked(id) => Some(*id),
            _ => None,
        }
    }
}

/// Externally visible availability row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub venue_id: Ulid,
    pub court_id: Ulid,
    pub date: NaiveDate,
    pub start_time: u8,
    pub end_time: u8,
    pub is_available: bool,
    pub booking_id: Option<Ulid>,
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Khalti,
    /// Paid with loyalty points.
    Redemption,
}

/// A reservation of `[starting_hour, ending_hour)` on one court and date.
///
/// The slots it holds are found by filtering the court's slots on `Booked(id)`;
/// the booking itself keeps no list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub user_id: Ulid,
    pub venue_id: Ulid,
    pub court_id: Ulid,
    pub date: NaiveDate,
    pub starting_hour: u8,
    pub ending_hour: u8,
    pub duration: u8,
    pub price: u64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub verification_code: Option<String>,
    pub challenge_id: Option<Ulid>,
    pub created_at: Ms,
}

impl Booking {
    pub fn hours(&self) -> std::ops::Range<u8> {
        self.starting_hour..self.ending_hour
    }
}

// ── Tournaments ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub court_id: Ulid,
    pub sport_id: Ulid,
    pub name: String,
    pub game_day: NaiveDate,
    pub game_end_day: NaiveDate,
    pub register_ends: Ms,
    pub total_teams: u32,
}

/// Fields a tournament update may change. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TournamentUpdate {
    pub court_id: Option<Ulid>,
    pub sport_id: Option<Ulid>,
    pub name: Option<String>,
    pub game_day: Option<NaiveDate>,
    pub game_end_day: Option<NaiveDate>,
    pub register_ends: Option<Ms>,
    pub total_teams: Option<u32>,
}

// ── Snapshots (WAL compaction) ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourtSnapshot {
    pub court: CourtInfo,
    pub generated_through: Option<NaiveDate>,
    pub slots: Vec<(SlotKey, SlotState)>,
    pub bookings: Vec<Booking>,
}

/// The WAL record format. One record per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    VenueRegistered {
        venue: VenueInfo,
    },
    VenueStatusChanged {
        id: Ulid,
        status: VenueStatus,
    },
    VenueScheduleChanged {
        id: Ulid,
        schedule: WeeklySchedule,
    },
    /// A new court together with its first window of free slots.
    CourtAdded {
        court: CourtInfo,
        through: Option<NaiveDate>,
        slots: Vec<SlotKey>,
    },
    CourtRemoved {
        id: Ulid,
        venue_id: Ulid,
    },
    CourtRestored {
        snapshot: CourtSnapshot,
    },
    SlotsGenerated {
        court_id: Ulid,
        through: NaiveDate,
        slots: Vec<SlotKey>,
    },
    WindowRolled {
        court_id: Ulid,
        dropped: Option<NaiveDate>,
        through: NaiveDate,
        slots: Vec<SlotKey>,
    },
    /// Free slots on `dates` are dropped, then `slots` are inserted where no row remains.
    DaysRegenerated {
        court_id: Ulid,
        dates: Vec<NaiveDate>,
        slots: Vec<SlotKey>,
    },
    BookingReserved {
        booking: Booking,
    },
    /// Hard delete by the booking's owner.
    BookingWithdrawn {
        id: Ulid,
        court_id: Ulid,
    },
    BookingVerified {
        id: Ulid,
        court_id: Ulid,
        user_id: Ulid,
        status: BookingStatus,
    },
    BookingAdvanced {
        id: Ulid,
        court_id: Ulid,
        status: BookingStatus,
    },
    PaymentRecorded {
        id: Ulid,
        court_id: Ulid,
        method: PaymentMethod,
        status: PaymentStatus,
    },
    VerificationIssued {
        id: Ulid,
        court_id: Ulid,
        code: String,
    },
    ChallengeAttached {
        id: Ulid,
        court_id: Ulid,
        challenge_id: Ulid,
    },
    CourtBlocked {
        court_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    },
    CourtUnblocked {
        court_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    },
    /// Manager override of a single row: free ⇄ blocked.
    SlotOverridden {
        court_id: Ulid,
        key: SlotKey,
        available: bool,
    },
    TournamentSaved {
        tournament: Tournament,
    },
    TournamentRemoved {
        id: Ulid,
    },
}

impl Event {
    /// The court whose lock guards this event, if any.
    pub fn court_id(&self) -> Option<Ulid> {
        match self {
            Event::SlotsGenerated { court_id, .. }
            | Event::WindowRolled { court_id, .. }
            | Event::DaysRegenerated { court_id, .. }
            | Event::BookingWithdrawn { court_id, .. }
            | Event::BookingVerified { court_id, .. }
            | Event::BookingAdvanced { court_id, .. }
            | Event::PaymentRecorded { court_id, .. }
            | Event::VerificationIssued { court_id, .. }
            | Event::ChallengeAttached { court_id, .. }
            | Event::CourtBlocked { court_id, .. }
            | Event::CourtUnblocked { court_id, .. }
            | Event::SlotOverridden { court_id, .. } => Some(*court_id),
            Event::BookingReserved { booking } => Some(booking.court_id),
            Event::CourtAdded { court, .. } => Some(court.id),
            Event::CourtRestored { snapshot } => Some(snapshot.court.id),
            Event::CourtRemoved { id, .. } => Some(*id),
            Event::VenueRegistered { .. }
            | Event::VenueStatusChanged { .. }
            | Event::VenueScheduleChanged { .. }
            | Event::TournamentSaved { .. }
            | Event::TournamentRemoved { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn slot_state_views() {
        let id = Ulid::new();
        assert!(SlotState::Free.is_available());
        assert_eq!(SlotState::Free.booking_id(), None);
        assert!(!SlotState::Booked(id).is_available());
        assert_eq!(SlotState::Booked(id).booking_id(), Some(id));
        assert!(!SlotState::Blocked.is_available());
        assert_eq!(SlotState::Blocked.booking_id(), None);
    }

    #[test]
    fn slot_keys_order_by_date_then_hour() {
        let mut keys = vec![
            SlotKey::new(ymd(2024, 6, 2), 6),
            SlotKey::new(ymd(2024, 6, 1), 20),
            SlotKey::new(ymd(2024, 6, 1), 7),
        ];
        keys.sort();
        assert_eq!(keys[0], SlotKey::new(ymd(2024, 6, 1), 7));
        assert_eq!(keys[2], SlotKey::new(ymd(2024, 6, 2), 6));
    }

    #[test]
    fn event_court_routing() {
        let court_id = Ulid::new();
        let ev = Event::CourtBlocked { court_id, from: ymd(2024, 6, 1), to: ymd(2024, 6, 2) };
        assert_eq!(ev.court_id(), Some(court_id));
        assert_eq!(Event::TournamentRemoved { id: Ulid::new() }.court_id(), None);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::SlotsGenerated {
            court_id: Ulid::new(),
            through: ymd(2024, 6, 7),
            slots: vec![SlotKey::new(ymd(2024, 6, 1), 6), SlotKey::new(ymd(2024, 6, 1), 7)],
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
