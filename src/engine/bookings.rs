use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::dispatch::transition_booking;
use crate::engine::lifecycle::BookingEvent;
use crate::engine::queue::enqueue_booking;
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::booking::{Booking, BookingStatus, FareAdjustment, NewBooking};
use crate::models::pricing::FareQuote;
use crate::state::AppState;

/// Prices a trip and records which pricing mode answered. Has no effect on
/// bookings, so it doubles as the quote preview.
pub fn quote_fare(state: &AppState, distance_km: f64, weight_tons: f64) -> FareQuote {
    let quote = state.pricing.calculate_fare(distance_km, weight_tons);

    let mode = if quote.fallback { "fallback" } else { "tiered" };
    state.metrics.fare_quotes_total.with_label_values(&[mode]).inc();

    if quote.fallback {
        warn!(
            distance_km = quote.distance_km,
            final_fare = quote.final_fare,
            "no pricing tier matched; fallback rate applied"
        );
    }

    quote
}

pub fn validate_quote_input(distance_km: f64, weight_tons: f64) -> Result<(), AppError> {
    if !(distance_km.is_finite() && distance_km >= 0.0) {
        return Err(AppError::BadRequest(
            "distance_km must be a non-negative number".to_string(),
        ));
    }

    if !(weight_tons.is_finite() && weight_tons >= 0.0) {
        return Err(AppError::BadRequest(
            "weight_tons must be a non-negative number".to_string(),
        ));
    }

    Ok(())
}

pub fn create_booking(state: &AppState, request: NewBooking) -> Result<Booking, AppError> {
    if !request.pickup.location.is_valid() || !request.dropoff.location.is_valid() {
        return Err(AppError::BadRequest("invalid pickup or drop coordinate".to_string()));
    }

    if request.pickup.address.trim().is_empty() || request.dropoff.address.trim().is_empty() {
        return Err(AppError::BadRequest("addresses cannot be empty".to_string()));
    }

    if request.vehicle_model.trim().is_empty() {
        return Err(AppError::BadRequest("vehicle_model cannot be empty".to_string()));
    }

    let distance_km = request
        .distance_km
        .unwrap_or_else(|| haversine_km(&request.pickup.location, &request.dropoff.location));
    validate_quote_input(distance_km, request.weight_tons)?;

    let fare = quote_fare(state, distance_km, request.weight_tons);
    let id = Uuid::new_v4();
    let code = reserve_code(state, id);
    let now = Utc::now();

    let booking = Booking {
        id,
        code,
        pickup: request.pickup,
        dropoff: request.dropoff,
        vehicle_model: request.vehicle_model.trim().to_string(),
        distance_km,
        material: request.material,
        weight_tons: request.weight_tons,
        pickup_time: request.pickup_time.unwrap_or(now),
        fare,
        assigned_vendor: None,
        status: BookingStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    state.bookings.insert(booking.id, booking.clone());
    info!(
        booking_id = %booking.id,
        code = %booking.code,
        distance_km = booking.distance_km,
        fare = booking.fare.final_fare,
        "booking created"
    );

    Ok(booking)
}

/// Creates the booking and queues it for dispatch. A booking that cannot be
/// queued is removed again along with its code.
pub async fn submit_booking(state: &AppState, request: NewBooking) -> Result<Booking, AppError> {
    let booking = create_booking(state, request)?;

    if let Err(err) = enqueue_booking(state, booking.id).await {
        state.bookings.remove(&booking.id);
        state.booking_codes.remove(&booking.code);
        warn!(booking_id = %booking.id, code = %booking.code, error = %err, "booking discarded");
        return Err(err);
    }

    Ok(booking)
}

pub fn booking_by_code(state: &AppState, code: &str) -> Option<Booking> {
    let id = state.booking_codes.get(code).map(|entry| *entry.value())?;
    state.booking(&id)
}

/// Recomputes the fare of a booking no vendor has accepted yet. Offers
/// already issued keep the terms they were made with.
pub async fn reprice_booking(
    state: &Arc<AppState>,
    booking_id: Uuid,
    adjustment: FareAdjustment,
) -> Result<Booking, AppError> {
    let guard = state.booking_guard(booking_id);
    let _held = guard.lock().await;

    let current = state
        .booking(&booking_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

    if !matches!(
        current.status,
        BookingStatus::Pending | BookingStatus::SearchingVendor | BookingStatus::NoVendorAvailable
    ) {
        return Err(AppError::Conflict(format!(
            "booking {} is {} and can no longer be repriced",
            current.code,
            current.status.as_str()
        )));
    }

    let distance_km = adjustment.distance_km.unwrap_or(current.distance_km);
    let weight_tons = adjustment.weight_tons.unwrap_or(current.weight_tons);
    validate_quote_input(distance_km, weight_tons)?;

    let fare = quote_fare(state, distance_km, weight_tons);
    let updated = {
        let mut booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;
        booking.distance_km = distance_km;
        booking.weight_tons = weight_tons;
        booking.fare = fare;
        booking.updated_at = Utc::now();
        booking.clone()
    };

    info!(
        booking_id = %booking_id,
        previous_fare = current.fare.final_fare,
        fare = updated.fare.final_fare,
        "booking repriced"
    );

    Ok(updated)
}

#[derive(Debug, Clone, Serialize)]
pub struct TripProgress {
    pub booking: Booking,
    /// False when the booking was not in a state the step applies to.
    pub applied: bool,
}

pub async fn start_trip(state: &Arc<AppState>, booking_id: Uuid) -> Result<TripProgress, AppError> {
    advance_trip(state, booking_id, BookingEvent::TripStarted).await
}

pub async fn complete_trip(
    state: &Arc<AppState>,
    booking_id: Uuid,
) -> Result<TripProgress, AppError> {
    advance_trip(state, booking_id, BookingEvent::TripEnded).await
}

async fn advance_trip(
    state: &Arc<AppState>,
    booking_id: Uuid,
    event: BookingEvent,
) -> Result<TripProgress, AppError> {
    let progress = {
        let guard = state.booking_guard(booking_id);
        let _held = guard.lock().await;
        advance_trip_locked(state, booking_id, event)
    };

    state.release_booking_guard(&booking_id);
    progress
}

fn advance_trip_locked(
    state: &AppState,
    booking_id: Uuid,
    event: BookingEvent,
) -> Result<TripProgress, AppError> {
    if let Some(booking) = transition_booking(state, booking_id, event)? {
        return Ok(TripProgress {
            booking,
            applied: true,
        });
    }

    let booking = state
        .booking(&booking_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

    Ok(TripProgress {
        booking,
        applied: false,
    })
}

fn reserve_code(state: &AppState, booking_id: Uuid) -> String {
    let date = Utc::now().format("%y%m%d").to_string();

    loop {
        let raw = Uuid::new_v4().simple().to_string();
        let code = format!("FB{date}{}", raw[..6].to_uppercase());

        if let Entry::Vacant(slot) = state.booking_codes.entry(code.clone()) {
            slot.insert(booking_id);
            return code;
        }
    }
}
