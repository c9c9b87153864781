use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::engine::bookings::{
    booking_by_code, complete_trip, reprice_booking, start_trip, submit_booking, TripProgress,
};
use crate::engine::dispatch::{cancel_booking, retry_dispatch, CancelOutcome, DispatchOutcome};
use crate::error::AppError;
use crate::models::booking::{Booking, FareAdjustment, NewBooking};
use crate::models::offer::Offer;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(post_booking))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/code/:code", get(get_booking_by_code))
        .route("/bookings/:id/offers", get(list_booking_offers))
        .route("/bookings/:id/dispatch", post(redispatch))
        .route("/bookings/:id/cancel", post(cancel))
        .route("/bookings/:id/reprice", post(reprice))
        .route("/bookings/:id/start", post(start))
        .route("/bookings/:id/complete", post(complete))
}

async fn post_booking(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewBooking>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(submit_booking(&state, payload).await?))
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    state
        .booking(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))
}

async fn get_booking_by_code(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<Booking>, AppError> {
    booking_by_code(&state, &code)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("booking {code} not found")))
}

async fn list_booking_offers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Offer>>, AppError> {
    if state.booking(&id).is_none() {
        return Err(AppError::NotFound(format!("booking {id} not found")));
    }

    Ok(Json(state.offers_for_booking(&id)))
}

async fn redispatch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DispatchOutcome>, AppError> {
    Ok(Json(retry_dispatch(&state, id).await?))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelOutcome>, AppError> {
    Ok(Json(cancel_booking(&state, id).await?))
}

async fn reprice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FareAdjustment>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(reprice_booking(&state, id, payload).await?))
}

async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TripProgress>, AppError> {
    Ok(Json(start_trip(&state, id).await?))
}

async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TripProgress>, AppError> {
    Ok(Json(complete_trip(&state, id).await?))
}
