use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::calendar::days_inclusive;
use crate::model::*;

/// Everything one court owns: its slot rows and the bookings holding them.
///
/// At most one row exists per (date, hour). A row is `Booked(id)` only while
/// booking `id` holds it; free rows never carry a booking.
#[derive(Debug, Clone)]
pub struct CourtState {
    pub info: CourtInfo,
    /// Last date the generator has covered, even if that day produced no rows.
    pub generated_through: Option<NaiveDate>,
    slots: BTreeMap<NaiveDate, BTreeMap<u8, SlotState>>,
    bookings: HashMap<Ulid, Booking>,
}

impl CourtState {
    pub fn new(info: CourtInfo) -> Self {
        Self {
            info,
            generated_through: None,
            slots: BTreeMap::new(),
            bookings: HashMap::new(),
        }
    }

    pub fn from_snapshot(snapshot: CourtSnapshot) -> Self {
        let mut cs = Self::new(snapshot.court);
        cs.generated_through = snapshot.generated_through;
        for (key, state) in snapshot.slots {
            cs.slots.entry(key.date).or_default().insert(key.hour, state);
        }
        for booking in snapshot.bookings {
            cs.bookings.insert(booking.id, booking);
        }
        cs
    }

    pub fn snapshot(&self) -> CourtSnapshot {
        let slots = self
            .slots
            .iter()
            .flat_map(|(date, day)| day.iter().map(|(h, s)| (SlotKey::new(*date, *h), *s)))
            .collect();
        let mut bookings: Vec<Booking> = self.bookings.values().cloned().collect();
        bookings.sort_by_key(|b| b.id);
        CourtSnapshot {
            court: self.info.clone(),
            generated_through: self.generated_through,
            slots,
            bookings,
        }
    }

    // ── Slot queries ─────────────────────────────────────────

    pub fn slot_count(&self) -> usize {
        self.slots.values().map(BTreeMap::len).sum()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.slots.keys().copied()
    }

    pub fn oldest_date(&self) -> Option<NaiveDate> {
        self.slots.keys().next().copied()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.slots.keys().next_back().copied()
    }

    pub fn state_at(&self, date: NaiveDate, hour: u8) -> Option<SlotState> {
        self.slots.get(&date)?.get(&hour).copied()
    }

    /// Rows on `date`, ascending by start hour.
    pub fn rows_on(&self, date: NaiveDate) -> Vec<Slot> {
        let Some(day) = self.slots.get(&date) else {
            return Vec::new();
        };
        day.iter()
            .map(|(hour, state)| Slot {
                venue_id: self.info.venue_id,
                court_id: self.info.id,
                date,
                start_time: *hour,
                end_time: hour + 1,
                is_available: state.is_available(),
                booking_id: state.booking_id(),
            })
            .collect()
    }

    /// Earliest start and latest end among all rows on `date`, booked or not.
    pub fn bounds_on(&self, date: NaiveDate) -> Option<(u8, u8)> {
        let day = self.slots.get(&date)?;
        let first = *day.keys().next()?;
        let last = *day.keys().next_back()?;
        Some((first, last + 1))
    }

    /// End hour of the latest free slot on `date`.
    pub fn last_free_end(&self, date: NaiveDate) -> Option<u8> {
        self.slots
            .get(&date)?
            .iter()
            .rev()
            .find(|(_, s)| s.is_available())
            .map(|(h, _)| h + 1)
    }

    /// How many hours of `hours` exist on `date` and are free right now.
    pub fn free_in(&self, date: NaiveDate, hours: Range<u8>) -> usize {
        let Some(day) = self.slots.get(&date) else {
            return 0;
        };
        day.range(hours).filter(|(_, s)| s.is_available()).count()
    }

    /// First hour in `hours` that is missing or not free.
    pub fn first_unavailable(&self, date: NaiveDate, hours: Range<u8>) -> Option<u8> {
        let day = self.slots.get(&date);
        hours
            .into_iter()
            .find(|h| !day.and_then(|d| d.get(h)).is_some_and(SlotState::is_available))
    }

    pub fn unavailable_hours(&self, date: NaiveDate) -> BTreeSet<u8> {
        self.slots
            .get(&date)
            .map(|day| {
                day.iter()
                    .filter(|(_, s)| !s.is_available())
                    .map(|(h, _)| *h)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Hours held by `booking_id`, wherever they sit.
    pub fn held_by(&self, booking_id: Ulid) -> Vec<SlotKey> {
        self.slots
            .iter()
            .flat_map(|(date, day)| {
                day.iter()
                    .filter(move |(_, s)| s.booking_id() == Some(booking_id))
                    .map(move |(h, _)| SlotKey::new(*date, *h))
            })
            .collect()
    }

    // ── Booking queries ──────────────────────────────────────

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.get(id)
    }

    pub fn bookings(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.values()
    }

    // ── Mutation ─────────────────────────────────────────────

    fn insert_free(&mut self, slots: &[SlotKey]) {
        for key in slots {
            self.slots
                .entry(key.date)
                .or_default()
                .entry(key.hour)
                .or_insert(SlotState::Free);
        }
    }

    /// Insert a generated batch of free rows covering dates up to `through`.
    pub(super) fn add_generated(&mut self, through: NaiveDate, slots: &[SlotKey]) {
        self.insert_free(slots);
        self.extend_through(through);
    }

    fn extend_through(&mut self, through: NaiveDate) {
        self.generated_through = Some(self.generated_through.map_or(through, |g| g.max(through)));
    }

    /// Rewrite every row on `date` within `hours` through `f`.
    fn remap(&mut self, date: NaiveDate, hours: Range<u8>, f: impl Fn(SlotState) -> SlotState) {
        if let Some(day) = self.slots.get_mut(&date) {
            for (_, state) in day.range_mut(hours) {
                *state = f(*state);
            }
        }
    }

    fn remap_days(&mut self, from: NaiveDate, to: NaiveDate, f: impl Fn(SlotState) -> SlotState) {
        for date in days_inclusive(from, to) {
            self.remap(date, 0..24, &f);
        }
    }

    /// Apply a court-scoped event. Court creation and removal happen one level up.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::SlotsGenerated { through, slots, .. } => self.add_generated(*through, slots),
            Event::WindowRolled { dropped, through, slots, .. } => {
                if let Some(date) = dropped {
                    self.slots.remove(date);
                }
                self.insert_free(slots);
                self.extend_through(*through);
            }
            Event::DaysRegenerated { dates, slots, .. } => {
                for date in dates {
                    if let Some(day) = self.slots.get_mut(date) {
                        day.retain(|_, s| !s.is_available());
                        if day.is_empty() {
                            self.slots.remove(date);
                        }
                    }
                }
                self.insert_free(slots);
            }
            Event::BookingReserved { booking } => {
                let id = booking.id;
                self.remap(booking.date, booking.hours(), |s| match s {
                    SlotState::Free => SlotState::Booked(id),
                    other => other,
                });
                self.bookings.insert(id, booking.clone());
            }
            Event::BookingWithdrawn { id, .. } => {
                if let Some(booking) = self.bookings.remove(id) {
                    let id = *id;
                    self.remap(booking.date, booking.hours(), |s| match s {
                        SlotState::Booked(holder) if holder == id => SlotState::Free,
                        other => other,
                    });
                }
            }
            Event::BookingVerified { id, status, .. } => {
                let Some(booking) = self.bookings.get_mut(id) else {
                    return;
                };
                booking.status = *status;
                let (date, hours, id) = (booking.date, booking.hours(), *id);
                match status {
                    BookingStatus::Cancelled => self.remap(date, hours, |s| match s {
                        SlotState::Booked(holder) if holder == id => SlotState::Free,
                        other => other,
                    }),
                    BookingStatus::Confirmed => self.remap(date, hours, |s| match s {
                        SlotState::Free => SlotState::Booked(id),
                        other => other,
                    }),
                    BookingStatus::Pending | BookingStatus::Completed => {}
                }
            }
            Event::BookingAdvanced { id, status, .. } => {
                if let Some(booking) = self.bookings.get_mut(id) {
                    booking.status = *status;
                }
            }
            Event::PaymentRecorded { id, method, status, .. } => {
                if let Some(booking) = self.bookings.get_mut(id) {
                    booking.payment_method = Some(*method);
                    booking.payment_status = *status;
                }
            }
            Event::VerificationIssued { id, code, .. } => {
                if let Some(booking) = self.bookings.get_mut(id) {
                    booking.verification_code = Some(code.clone());
                }
            }
            Event::ChallengeAttached { id, challenge_id, .. } => {
                if let Some(booking) = self.bookings.get_mut(id) {
                    booking.challenge_id = Some(*challenge_id);
                }
            }
            Event::CourtBlocked { from, to, .. } => self.remap_days(*from, *to, |s| match s {
                SlotState::Free => SlotState::Blocked,
                other => other,
            }),
            Event::CourtUnblocked { from, to, .. } => self.remap_days(*from, *to, |s| match s {
                SlotState::Blocked => SlotState::Free,
                other => other,
            }),
            Event::SlotOverridden { key, available, .. } => {
                let available = *available;
                self.remap(key.date, key.hour..key.hour + 1, |s| match s {
                    SlotState::Blocked if available => SlotState::Free,
                    SlotState::Free if !available => SlotState::Blocked,
                    other => other,
                });
            }
            Event::VenueRegistered { .. }
            | Event::VenueStatusChanged { .. }
            | Event::VenueScheduleChanged { .. }
            | Event::CourtAdded { .. }
            | Event::CourtRemoved { .. }
            | Event::CourtRestored { .. }
            | Event::TournamentSaved { .. }
            | Event::TournamentRemoved { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn court() -> CourtState {
        CourtState::new(CourtInfo {
            id: Ulid::new(),
            venue_id: Ulid::new(),
            sport: "futsal".into(),
            price_per_hour: 1500,
            status: CourtStatus::Available,
        })
    }

    fn generate(cs: &mut CourtState, date: NaiveDate, hours: Range<u8>) {
        let court_id = cs.info.id;
        cs.apply(&Event::SlotsGenerated {
            court_id,
            through: date,
            slots: hours.map(|h| SlotKey::new(date, h)).collect(),
        });
    }

    fn booking(cs: &CourtState, date: NaiveDate, start: u8, duration: u8) -> Booking {
        Booking {
            id: Ulid::new(),
            user_id: Ulid::new(),
            venue_id: cs.info.venue_id,
            court_id: cs.info.id,
            date,
            starting_hour: start,
            ending_hour: start + duration,
            duration,
            price: cs.info.price_per_hour * u64::from(duration),
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            verification_code: None,
            challenge_id: None,
            created_at: 0,
        }
    }

    #[test]
    fn generation_never_duplicates_rows() {
        let mut cs = court();
        let d = ymd(2024, 6, 1);
        generate(&mut cs, d, 6..22);
        generate(&mut cs, d, 6..22);
        assert_eq!(cs.slot_count(), 16);
        assert_eq!(cs.bounds_on(d), Some((6, 22)));
        assert_eq!(cs.generated_through, Some(d));
    }

    #[test]
    fn reserve_then_withdraw_restores_rows() {
        let mut cs = court();
        let d = ymd(2024, 6, 1);
        generate(&mut cs, d, 6..22);
        let b = booking(&cs, d, 18, 2);
        cs.apply(&Event::BookingReserved { booking: b.clone() });
        assert_eq!(cs.state_at(d, 18), Some(SlotState::Booked(b.id)));
        assert_eq!(cs.state_at(d, 19), Some(SlotState::Booked(b.id)));
        assert_eq!(cs.state_at(d, 20), Some(SlotState::Free));
        assert_eq!(cs.held_by(b.id).len(), 2);
        assert_eq!(cs.first_unavailable(d, 17..20), Some(18));

        cs.apply(&Event::BookingWithdrawn { id: b.id, court_id: cs.info.id });
        assert!(cs.booking(&b.id).is_none());
        assert_eq!(cs.free_in(d, 6..22), 16);
    }

    #[test]
    fn withdraw_leaves_other_holders_alone() {
        let mut cs = court();
        let d = ymd(2024, 6, 1);
        generate(&mut cs, d, 6..22);
        let first = booking(&cs, d, 10, 2);
        cs.apply(&Event::BookingReserved { booking: first.clone() });
        // Manager cancels, someone else takes 11:00, then the first user withdraws.
        cs.apply(&Event::BookingVerified {
            id: first.id,
            court_id: cs.info.id,
            user_id: first.user_id,
            status: BookingStatus::Cancelled,
        });
        let second = booking(&cs, d, 11, 1);
        cs.apply(&Event::BookingReserved { booking: second.clone() });
        cs.apply(&Event::BookingWithdrawn { id: first.id, court_id: cs.info.id });

        assert_eq!(cs.state_at(d, 10), Some(SlotState::Free));
        assert_eq!(cs.state_at(d, 11), Some(SlotState::Booked(second.id)));
    }

    #[test]
    fn last_free_end_skips_taken_tail() {
        let mut cs = court();
        let d = ymd(2024, 6, 1);
        generate(&mut cs, d, 6..22);
        let b = booking(&cs, d, 20, 2);
        cs.apply(&Event::BookingReserved { booking: b });
        assert_eq!(cs.last_free_end(d), Some(20));
        assert_eq!(cs.last_free_end(ymd(2024, 6, 2)), None);
    }

    #[test]
    fn block_and_unblock_spare_bookings() {
        let mut cs = court();
        let (d1, d2) = (ymd(2024, 6, 1), ymd(2024, 6, 2));
        generate(&mut cs, d1, 6..22);
        generate(&mut cs, d2, 6..22);
        let b = booking(&cs, d2, 8, 1);
        cs.apply(&Event::BookingReserved { booking: b.clone() });

        cs.apply(&Event::CourtBlocked { court_id: cs.info.id, from: d1, to: d2 });
        assert_eq!(cs.free_in(d1, 0..24), 0);
        assert_eq!(cs.state_at(d2, 8), Some(SlotState::Booked(b.id)));
        assert_eq!(cs.state_at(d2, 9), Some(SlotState::Blocked));

        cs.apply(&Event::CourtUnblocked { court_id: cs.info.id, from: d1, to: d2 });
        assert_eq!(cs.free_in(d1, 0..24), 16);
        assert_eq!(cs.state_at(d2, 8), Some(SlotState::Booked(b.id)));
        assert_eq!(cs.free_in(d2, 0..24), 15);
    }

    #[test]
    fn override_never_touches_booked_rows() {
        let mut cs = court();
        let d = ymd(2024, 6, 1);
        generate(&mut cs, d, 6..22);
        let b = booking(&cs, d, 8, 1);
        cs.apply(&Event::BookingReserved { booking: b.clone() });
        let court_id = cs.info.id;

        cs.apply(&Event::SlotOverridden { court_id, key: SlotKey::new(d, 9), available: false });
        cs.apply(&Event::SlotOverridden { court_id, key: SlotKey::new(d, 8), available: true });
        assert_eq!(cs.state_at(d, 9), Some(SlotState::Blocked));
        assert_eq!(cs.state_at(d, 8), Some(SlotState::Booked(b.id)));

        cs.apply(&Event::SlotOverridden { court_id, key: SlotKey::new(d, 9), available: true });
        assert_eq!(cs.state_at(d, 9), Some(SlotState::Free));
    }

    #[test]
    fn regenerate_keeps_unavailable_rows() {
        let mut cs = court();
        let d = ymd(2024, 6, 3);
        generate(&mut cs, d, 6..22);
        let b = booking(&cs, d, 7, 1);
        cs.apply(&Event::BookingReserved { booking: b.clone() });

        cs.apply(&Event::DaysRegenerated {
            court_id: cs.info.id,
            dates: vec![d],
            slots: (8..22).map(|h| SlotKey::new(d, h)).collect(),
        });
        assert_eq!(cs.state_at(d, 6), None);
        assert_eq!(cs.state_at(d, 7), Some(SlotState::Booked(b.id)));
        assert_eq!(cs.free_in(d, 0..24), 14);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut cs = court();
        let d = ymd(2024, 6, 1);
        generate(&mut cs, d, 6..10);
        let b = booking(&cs, d, 6, 1);
        cs.apply(&Event::BookingReserved { booking: b });
        let restored = CourtState::from_snapshot(cs.snapshot());
        assert_eq!(restored.snapshot(), cs.snapshot());
    }
}
