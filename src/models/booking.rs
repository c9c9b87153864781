use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::pricing::FareQuote;
use crate::models::vendor::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub location: GeoPoint,
    pub address: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    SearchingVendor,
    Confirmed,
    InTransit,
    Completed,
    Cancelled,
    NoVendorAvailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub code: String,
    pub pickup: Place,
    pub dropoff: Place,
    pub vehicle_model: String,
    pub distance_km: f64,
    pub material: Option<String>,
    pub weight_tons: f64,
    pub pickup_time: DateTime<Utc>,
    pub fare: FareQuote,
    pub assigned_vendor: Option<Uuid>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub pickup: Place,
    pub dropoff: Place,
    pub vehicle_model: String,
    /// Trip distance; derived from the coordinates when absent.
    pub distance_km: Option<f64>,
    pub material: Option<String>,
    #[serde(default)]
    pub weight_tons: f64,
    pub pickup_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FareAdjustment {
    pub distance_km: Option<f64>,
    pub weight_tons: Option<f64>,
}
