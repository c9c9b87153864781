use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::dispatch::{respond_to_offer, OfferResolution, VendorDecision};
use crate::error::AppError;
use crate::models::offer::Offer;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/offers/:id", get(get_offer))
        .route("/offers/:id/accept", post(accept_offer))
        .route("/offers/:id/reject", post(reject_offer))
}

#[derive(Deserialize)]
pub struct OfferResponseRequest {
    pub vendor_id: Uuid,
}

async fn get_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Offer>, AppError> {
    state
        .offer(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("offer {id} not found")))
}

async fn accept_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OfferResponseRequest>,
) -> Result<Json<OfferResolution>, AppError> {
    let resolution =
        respond_to_offer(&state, id, payload.vendor_id, VendorDecision::Accept).await?;
    Ok(Json(resolution))
}

async fn reject_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OfferResponseRequest>,
) -> Result<Json<OfferResolution>, AppError> {
    let resolution =
        respond_to_offer(&state, id, payload.vendor_id, VendorDecision::Reject).await?;
    Ok(Json(resolution))
}
