//! Closed transition tables for bookings and offers.
//!
//! Callers never assign a status directly; they feed an event and get back
//! the next state, or `None` when the event is not legal from the current
//! state. A `None` is a no-op for the caller, never a failure.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::booking::{Booking, BookingStatus};
use crate::models::offer::{CloseReason, Offer, OfferStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEvent {
    DispatchStarted,
    OfferAccepted { vendor_id: Uuid },
    NoCandidates,
    TripStarted,
    TripEnded,
    CancelRequested,
    RetryRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferEvent {
    Accept,
    Reject,
    Expire,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::NoVendorAvailable
        )
    }

    pub fn next(self, event: &BookingEvent) -> Option<BookingStatus> {
        use BookingStatus::*;

        match (self, event) {
            (Pending, BookingEvent::DispatchStarted) => Some(SearchingVendor),
            (SearchingVendor, BookingEvent::OfferAccepted { .. }) => Some(Confirmed),
            (SearchingVendor, BookingEvent::NoCandidates) => Some(NoVendorAvailable),
            (Confirmed, BookingEvent::TripStarted) => Some(InTransit),
            (InTransit, BookingEvent::TripEnded) => Some(Completed),
            (NoVendorAvailable, BookingEvent::RetryRequested) => Some(Pending),
            (status, BookingEvent::CancelRequested) if !status.is_terminal() => Some(Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::SearchingVendor => "searching_vendor",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InTransit => "in_transit",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoVendorAvailable => "no_vendor_available",
        }
    }
}

impl OfferStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OfferStatus::Pending)
    }

    pub fn next(self, event: OfferEvent) -> Option<OfferStatus> {
        match (self, event) {
            (OfferStatus::Pending, OfferEvent::Accept) => Some(OfferStatus::Accepted),
            (OfferStatus::Pending, OfferEvent::Reject) => Some(OfferStatus::Rejected),
            (OfferStatus::Pending, OfferEvent::Expire) => Some(OfferStatus::Expired),
            _ => None,
        }
    }
}

impl CloseReason {
    pub fn event(&self) -> OfferEvent {
        match self {
            CloseReason::Accepted => OfferEvent::Accept,
            CloseReason::Expired => OfferEvent::Expire,
            CloseReason::VendorRejected
            | CloseReason::VendorOffline
            | CloseReason::BookingCancelled => OfferEvent::Reject,
        }
    }
}

impl Booking {
    /// Applies `event` and keeps `assigned_vendor` consistent with the new
    /// status. Returns `false` and leaves the booking untouched when the
    /// transition is not legal.
    pub fn apply(&mut self, event: BookingEvent, at: DateTime<Utc>) -> bool {
        let Some(next) = self.status.next(&event) else {
            return false;
        };

        match event {
            BookingEvent::OfferAccepted { vendor_id } => self.assigned_vendor = Some(vendor_id),
            BookingEvent::CancelRequested | BookingEvent::RetryRequested => {
                self.assigned_vendor = None
            }
            _ => {}
        }

        self.status = next;
        self.updated_at = at;
        true
    }
}

impl Offer {
    pub fn close(&mut self, reason: CloseReason, at: DateTime<Utc>) -> bool {
        let Some(next) = self.status.next(reason.event()) else {
            return false;
        };

        self.status = next;
        self.close_reason = Some(reason);
        self.responded_at = Some(at);
        true
    }
}
