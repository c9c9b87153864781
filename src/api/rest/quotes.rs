use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine::bookings::{quote_fare, validate_quote_input};
use crate::error::AppError;
use crate::models::pricing::{FareQuote, PriceTier};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quotes", post(create_quote))
        .route("/pricing/tiers", get(list_tiers))
}

#[derive(Deserialize)]
pub struct QuoteRequest {
    pub distance_km: f64,
    #[serde(default)]
    pub weight_tons: f64,
}

async fn create_quote(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QuoteRequest>,
) -> Result<Json<FareQuote>, AppError> {
    validate_quote_input(payload.distance_km, payload.weight_tons)?;
    Ok(Json(quote_fare(&state, payload.distance_km, payload.weight_tons)))
}

async fn list_tiers(State(state): State<Arc<AppState>>) -> Json<Vec<PriceTier>> {
    Json(state.pricing.tiers().to_vec())
}
