use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

/// Why an offer left `pending`. Vendor-offline and cancellation close the
/// offer as `rejected`; the reason keeps them apart for vendors and logs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Accepted,
    VendorRejected,
    Expired,
    VendorOffline,
    BookingCancelled,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Accepted => "accepted",
            CloseReason::VendorRejected => "rejected",
            CloseReason::Expired => "expired",
            CloseReason::VendorOffline => "vendor_offline",
            CloseReason::BookingCancelled => "booking_cancelled",
        }
    }
}

/// Booking terms as they stood when the offer was issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferTerms {
    pub pickup_time: DateTime<Utc>,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub vehicle_model: String,
    pub distance_km: f64,
    pub fare: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub booking_code: String,
    pub vendor_id: Uuid,
    pub sequence: u32,
    pub distance_to_pickup_km: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub status: OfferStatus,
    pub close_reason: Option<CloseReason>,
    pub terms: OfferTerms,
}
