use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VendorStatus {
    Offline,
    Available,
    OfferPending,
}

/// The offer (and its booking) currently holding a vendor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VendorLock {
    pub offer_id: Uuid,
    pub booking_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: Uuid,
    pub name: String,
    /// Vehicle model the vendor's approved truck belongs to.
    pub vehicle_model: String,
    pub location: Option<GeoPoint>,
    pub status: VendorStatus,
    pub approved: bool,
    pub listed: bool,
    pub locked_by: Option<VendorLock>,
    pub updated_at: DateTime<Utc>,
}

impl Vendor {
    pub fn can_accept_bookings(&self) -> bool {
        self.approved && self.listed && self.status == VendorStatus::Available
    }
}
