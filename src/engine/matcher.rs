use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use crate::geo::haversine_km;
use crate::models::vendor::{GeoPoint, Vendor};

pub const DEFAULT_RADIUS_KM: f64 = 30.0;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Candidate {
    pub vendor_id: Uuid,
    pub distance_km: f64,
}

/// Eligible vendors within `radius_km` of `origin`, nearest first. Ties on
/// distance fall back to the vendor id so the order is stable.
pub fn find_candidates(
    origin: &GeoPoint,
    vehicle_model: &str,
    radius_km: f64,
    excluded: &HashSet<Uuid>,
    pool: &[Vendor],
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = pool
        .iter()
        .filter(|vendor| {
            vendor.can_accept_bookings()
                && vendor.vehicle_model == vehicle_model
                && !excluded.contains(&vendor.id)
        })
        .filter_map(|vendor| {
            let location = vendor.location.as_ref()?;
            let distance_km = haversine_km(origin, location);

            (distance_km <= radius_km).then_some(Candidate {
                vendor_id: vendor.id,
                distance_km,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.vendor_id.cmp(&b.vendor_id))
    });

    candidates
}
