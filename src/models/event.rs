use serde::Serialize;
use uuid::Uuid;

use crate::models::booking::BookingStatus;
use crate::models::offer::{CloseReason, Offer, OfferStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    OfferCreated {
        offer: Offer,
    },
    OfferClosed {
        offer_id: Uuid,
        booking_id: Uuid,
        vendor_id: Uuid,
        status: OfferStatus,
        reason: CloseReason,
    },
    BookingUpdated {
        booking_id: Uuid,
        code: String,
        status: BookingStatus,
        assigned_vendor: Option<Uuid>,
    },
}

impl DispatchEvent {
    pub fn vendor_id(&self) -> Option<Uuid> {
        match self {
            DispatchEvent::OfferCreated { offer } => Some(offer.vendor_id),
            DispatchEvent::OfferClosed { vendor_id, .. } => Some(*vendor_id),
            DispatchEvent::BookingUpdated {
                assigned_vendor, ..
            } => *assigned_vendor,
        }
    }

    pub fn booking_id(&self) -> Uuid {
        match self {
            DispatchEvent::OfferCreated { offer } => offer.booking_id,
            DispatchEvent::OfferClosed { booking_id, .. } => *booking_id,
            DispatchEvent::BookingUpdated { booking_id, .. } => *booking_id,
        }
    }
}
