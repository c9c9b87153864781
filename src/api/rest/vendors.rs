use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::dispatch::{vendor_offline, OfferResolution};
use crate::error::AppError;
use crate::models::offer::Offer;
use crate::models::vendor::{GeoPoint, Vendor, VendorStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/vendors", post(register_vendor).get(list_vendors))
        .route("/vendors/:id", get(get_vendor))
        .route("/vendors/:id/online", post(go_online))
        .route("/vendors/:id/offline", post(go_offline))
        .route("/vendors/:id/location", patch(update_vendor_location))
        .route("/vendors/:id/offers", get(list_vendor_offers))
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
pub struct RegisterVendorRequest {
    pub name: String,
    pub vehicle_model: String,
    pub location: Option<GeoPoint>,
    #[serde(default = "default_true")]
    pub approved: bool,
    #[serde(default = "default_true")]
    pub listed: bool,
    #[serde(default = "default_true")]
    pub online: bool,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Serialize)]
pub struct OfflineResponse {
    pub vendor: Vendor,
    pub released_offer: Option<OfferResolution>,
}

async fn register_vendor(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterVendorRequest>,
) -> Result<Json<Vendor>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if payload.vehicle_model.trim().is_empty() {
        return Err(AppError::BadRequest("vehicle_model cannot be empty".to_string()));
    }

    if payload.location.is_some_and(|location| !location.is_valid()) {
        return Err(AppError::BadRequest("invalid location".to_string()));
    }

    let vendor = Vendor {
        id: Uuid::new_v4(),
        name: payload.name,
        vehicle_model: payload.vehicle_model.trim().to_string(),
        location: payload.location,
        status: if payload.online {
            VendorStatus::Available
        } else {
            VendorStatus::Offline
        },
        approved: payload.approved,
        listed: payload.listed,
        locked_by: None,
        updated_at: Utc::now(),
    };

    state.vendors.insert(vendor.clone());
    Ok(Json(vendor))
}

async fn list_vendors(State(state): State<Arc<AppState>>) -> Json<Vec<Vendor>> {
    Json(state.vendors.snapshot())
}

async fn get_vendor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vendor>, AppError> {
    state
        .vendors
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("vendor {id} not found")))
}

async fn go_online(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vendor>, AppError> {
    Ok(Json(state.vendors.set_online(&id)?))
}

async fn go_offline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OfflineResponse>, AppError> {
    let (vendor, released_offer) = vendor_offline(&state, id).await?;
    Ok(Json(OfflineResponse {
        vendor,
        released_offer,
    }))
}

async fn update_vendor_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Vendor>, AppError> {
    if !payload.location.is_valid() {
        return Err(AppError::BadRequest("invalid location".to_string()));
    }

    Ok(Json(state.vendors.update_location(&id, payload.location)?))
}

async fn list_vendor_offers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Offer>>, AppError> {
    if state.vendors.get(&id).is_none() {
        return Err(AppError::NotFound(format!("vendor {id} not found")));
    }

    Ok(Json(state.offers_for_vendor(&id)))
}
