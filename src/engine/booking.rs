use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::calendar::local_instant;
use crate::limits::*;
use crate::model::*;
use crate::observability::{self, rejection_label};

use super::{Engine, EngineError};

/// Outcome of one auto-advance pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AdvanceReport {
    pub completed: usize,
    pub cancelled: usize,
    pub failed: Vec<(Ulid, String)>,
}

fn validate_range(start_hour: u8, duration: u8) -> Result<(), EngineError> {
    if duration == 0 {
        return Err(EngineError::Validation("duration must be at least one hour"));
    }
    if duration > MAX_BOOKING_HOURS {
        return Err(EngineError::LimitExceeded("booking too long"));
    }
    if start_hour > 23 {
        return Err(EngineError::Validation("start hour must be within 0..=23"));
    }
    if u16::from(start_hour) + u16::from(duration) > 24 {
        return Err(EngineError::Validation("booking must end by midnight"));
    }
    Ok(())
}

fn verification_code() -> String {
    (1000 + Ulid::new().random() % 9000).to_string()
}

impl Engine {
    /// Reserve `duration` consecutive hours from `start_hour`.
    ///
    /// The court's write lock is held from the boundary check to the claim,
    /// so two overlapping reservations can never both pass the conflict check.
    pub async fn reserve(
        &self,
        user_id: Ulid,
        venue_id: Ulid,
        court_id: Ulid,
        date: NaiveDate,
        start_hour: u8,
        duration: u8,
    ) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self
            .reserve_inner(user_id, venue_id, court_id, date, start_hour, duration)
            .await;
        metrics::histogram!(observability::RESERVE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        match &result {
            Ok(booking) => {
                metrics::counter!(observability::BOOKINGS_RESERVED_TOTAL).increment(1);
                info!(
                    "booking {} reserved court {court_id} on {date} {}:00-{}:00",
                    booking.id, booking.starting_hour, booking.ending_hour
                );
            }
            Err(e) => {
                metrics::counter!(observability::BOOKINGS_REJECTED_TOTAL, "reason" => rejection_label(e.kind()))
                    .increment(1);
                debug!("reserve on court {court_id} {date} {start_hour}+{duration} rejected: {e}");
            }
        }
        result
    }

    async fn reserve_inner(
        &self,
        user_id: Ulid,
        venue_id: Ulid,
        court_id: Ulid,
        date: NaiveDate,
        start_hour: u8,
        duration: u8,
    ) -> Result<Booking, EngineError> {
        validate_range(start_hour, duration)?;
        self.venue(&venue_id)?;
        let rs = self.get_court(&court_id).ok_or(EngineError::NotFound(court_id))?;
        let mut guard = rs.write().await;
        if guard.info.venue_id != venue_id {
            return Err(EngineError::CourtNotInVenue { court_id, venue_id });
        }

        let closes_at = guard
            .last_free_end(date)
            .ok_or(EngineError::VenueClosed { court_id, date })?;
        let end_hour = start_hour + duration;
        if end_hour > closes_at {
            return Err(EngineError::ExceedsAvailableTime {
                requested_end: end_hour,
                closes_at,
            });
        }
        let price = guard.info.price_per_hour * u64::from(duration);

        let hours = start_hour..end_hour;
        if let Some(hour) = guard.first_unavailable(date, hours.clone()) {
            return Err(EngineError::SlotTaken { date, hour });
        }
        // Conditional claim: every hour must be present and free.
        if guard.free_in(date, hours) != usize::from(duration) {
            return Err(EngineError::SlotTaken { date, hour: start_hour });
        }

        let booking = Booking {
            id: Ulid::new(),
            user_id,
            venue_id,
            court_id,
            date,
            starting_hour: start_hour,
            ending_hour: end_hour,
            duration,
            price,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            verification_code: None,
            challenge_id: None,
            created_at: self.now_ms(),
        };
        let event = Event::BookingReserved { booking: booking.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(booking)
    }

    /// Hard-delete a booking on its owner's request, releasing the hours it
    /// holds whatever its status. Returns the deleted booking, including any
    /// challenge that went with it.
    pub async fn cancel_booking(&self, booking_id: Ulid, user_id: Ulid) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.user_id != user_id {
            return Err(EngineError::Unauthorized(user_id));
        }

        let event = Event::BookingWithdrawn {
            id: booking_id,
            court_id: booking.court_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        match booking.challenge_id {
            Some(challenge) => info!("booking {booking_id} cancelled by owner, challenge {challenge} dropped"),
            None => info!("booking {booking_id} cancelled by owner"),
        }
        Ok(booking)
    }

    /// Manager confirms or cancels a booking. Cancelling frees the hours the
    /// booking still holds; confirming re-links any that drifted free.
    pub async fn verify_booking(
        &self,
        venue_id: Ulid,
        booking_id: Ulid,
        status: BookingStatus,
        manager_id: Ulid,
    ) -> Result<Booking, EngineError> {
        if !matches!(status, BookingStatus::Confirmed | BookingStatus::Cancelled) {
            return Err(EngineError::Validation("status must be CONFIRMED or CANCELLED"));
        }
        let venue = self.venue(&venue_id)?;
        if venue.owner_id != manager_id {
            return Err(EngineError::Unauthorized(manager_id));
        }

        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.venue_id != venue_id {
            return Err(EngineError::NotFound(booking_id));
        }

        let event = Event::BookingVerified {
            id: booking_id,
            court_id: booking.court_id,
            user_id: booking.user_id,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        let label = match status {
            BookingStatus::Confirmed => "confirmed",
            _ => "cancelled",
        };
        metrics::counter!(observability::BOOKINGS_VERIFIED_TOTAL, "status" => label).increment(1);
        info!("booking {booking_id} {label} by venue {venue_id}");

        guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    /// Move every CONFIRMED booking whose end is strictly in the past to
    /// COMPLETED (paid) or CANCELLED (unpaid). Slots are left alone.
    pub async fn advance_booking_statuses(&self) -> AdvanceReport {
        let now_ms = self.now_ms();
        let mut report = AdvanceReport::default();

        for court_id in self.court_ids() {
            let Some(rs) = self.get_court(&court_id) else { continue };
            let mut guard = rs.write().await;
            let due: Vec<(Ulid, PaymentStatus)> = guard
                .bookings()
                .filter(|b| b.status == BookingStatus::Confirmed)
                .filter(|b| local_instant(b.date, b.ending_hour, self.offset).timestamp_millis() < now_ms)
                .map(|b| (b.id, b.payment_status))
                .collect();

            for (id, payment) in due {
                let status = if payment == PaymentStatus::Success {
                    BookingStatus::Completed
                } else {
                    BookingStatus::Cancelled
                };
                let event = Event::BookingAdvanced { id, court_id, status };
                match self.persist_and_apply(&mut guard, &event).await {
                    Ok(()) => {
                        let label = if status == BookingStatus::Completed {
                            report.completed += 1;
                            "completed"
                        } else {
                            report.cancelled += 1;
                            "cancelled"
                        };
                        metrics::counter!(observability::BOOKINGS_ADVANCED_TOTAL, "status" => label).increment(1);
                    }
                    Err(e) => {
                        warn!("failed to advance booking {id} on court {court_id}: {e}");
                        report.failed.push((court_id, e.to_string()));
                        break;
                    }
                }
            }
        }
        report
    }

    /// Store the payment oracle's verdict for a booking.
    pub async fn record_payment(
        &self,
        booking_id: Ulid,
        method: PaymentMethod,
        status: PaymentStatus,
    ) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let court_id = guard.info.id;
        let event = Event::PaymentRecorded {
            id: booking_id,
            court_id,
            method,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    /// Hand out the booking's 4-digit check-in code once payment is settled.
    /// Khalti needs a successful payment; cash is settled at the venue.
    pub async fn issue_verification_code(&self, booking_id: Ulid) -> Result<String, EngineError> {
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        if let Some(code) = booking.verification_code {
            return Ok(code);
        }
        match (booking.payment_method, booking.payment_status) {
            (Some(PaymentMethod::Khalti), PaymentStatus::Success) | (Some(PaymentMethod::Cash), _) => {}
            (Some(PaymentMethod::Khalti), _) => {
                return Err(EngineError::Validation("khalti payment has not succeeded"));
            }
            _ => return Err(EngineError::Validation("payment method does not take a verification code")),
        }

        let code = verification_code();
        let event = Event::VerificationIssued {
            id: booking_id,
            court_id: booking.court_id,
            code: code.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(code)
    }

    /// Link an opponent-matching challenge to a booking. One per booking.
    pub async fn attach_challenge(&self, booking_id: Ulid, challenge_id: Ulid) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        if let Some(existing) = booking.challenge_id {
            return Err(EngineError::AlreadyExists(existing));
        }
        let event = Event::ChallengeAttached {
            id: booking_id,
            court_id: booking.court_id,
            challenge_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    pub async fn booking(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let court_id = self
            .get_court_for_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let rs = self.get_court(&court_id).ok_or(EngineError::NotFound(booking_id))?;
        let guard = rs.read().await;
        guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    /// A venue's bookings, newest first, optionally narrowed to one court or status.
    pub async fn bookings_for_venue(
        &self,
        venue_id: Ulid,
        court_id: Option<Ulid>,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, EngineError> {
        let venue = self.venue(&venue_id)?;
        let mut out = Vec::new();
        for id in venue.courts.iter().filter(|id| court_id.is_none_or(|c| c == **id)) {
            let Some(rs) = self.get_court(id) else { continue };
            let guard = rs.read().await;
            out.extend(
                guard
                    .bookings()
                    .filter(|b| status.is_none_or(|s| s == b.status))
                    .cloned(),
            );
        }
        sort_newest_first(&mut out);
        Ok(out)
    }

    /// Every booking made by `user_id`, newest first.
    pub async fn bookings_for_user(&self, user_id: Ulid) -> Vec<Booking> {
        let mut out = Vec::new();
        for court_id in self.court_ids() {
            let Some(rs) = self.get_court(&court_id) else { continue };
            let guard = rs.read().await;
            out.extend(guard.bookings().filter(|b| b.user_id == user_id).cloned());
        }
        sort_newest_first(&mut out);
        out
    }
}

fn sort_newest_first(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}
