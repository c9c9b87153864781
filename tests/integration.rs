use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use freight_dispatch::api::rest::router;
use freight_dispatch::config::DispatchSettings;
use freight_dispatch::engine::dispatch::run_dispatch_engine;
use freight_dispatch::engine::pricing::PricingEngine;
use freight_dispatch::models::pricing::{FallbackRate, WeightSurcharge};
use freight_dispatch::state::AppState;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

fn new_state() -> (AppState, mpsc::Receiver<Uuid>) {
    let pricing = PricingEngine::new(
        PricingEngine::default_tiers(),
        Some(FallbackRate {
            per_km_rate: 10.0,
            minimum_charge: 250.0,
        }),
        WeightSurcharge::default(),
    )
    .unwrap();
    AppState::new(DispatchSettings::default(), pricing, 1024, 1024)
}

fn setup() -> (axum::Router, mpsc::Receiver<Uuid>) {
    let (state, rx) = new_state();
    (router(Arc::new(state)), rx)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn vendor_body(name: &str, lat: f64, lng: f64) -> Value {
    json!({
        "name": name,
        "vehicle_model": "tata-407",
        "location": { "lat": lat, "lng": lng }
    })
}

fn booking_body() -> Value {
    json!({
        "pickup": { "location": { "lat": 19.0760, "lng": 72.8777 }, "address": "Andheri East, Mumbai" },
        "dropoff": { "location": { "lat": 19.2183, "lng": 72.9781 }, "address": "Thane West" },
        "vehicle_model": "tata-407",
        "distance_km": 40.0,
        "material": "cement bags",
        "weight_tons": 5.0
    })
}

async fn register_vendor(app: &axum::Router, name: &str, lat: f64, lng: f64) -> String {
    let res = app
        .clone()
        .oneshot(json_request("POST", "/vendors", vendor_body(name, lat, lng)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await["id"].as_str().unwrap().to_string()
}

async fn wait_for_offers(app: &axum::Router, booking_id: &str, count: usize) -> Vec<Value> {
    for _ in 0..40 {
        let res = app
            .clone()
            .oneshot(get_request(&format!("/bookings/{booking_id}/offers")))
            .await
            .unwrap();
        let offers = body_json(res).await.as_array().unwrap().clone();
        if offers.len() >= count {
            return offers;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }
    panic!("booking {booking_id} never reached {count} offers");
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["vendors"], 0);
    assert_eq!(body["bookings"], 0);
    assert_eq!(body["offers"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("bookings_in_queue"));
    assert!(body.contains("vendors_locked"));
}

#[tokio::test]
async fn register_vendor_returns_available_vendor() {
    let (app, _rx) = setup();
    let response = app
        .oneshot(json_request("POST", "/vendors", vendor_body("Ravi Transport", 19.07, 72.88)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["name"], "Ravi Transport");
    assert_eq!(body["vehicle_model"], "tata-407");
    assert_eq!(body["status"], "available");
    assert_eq!(body["approved"], true);
    assert!(body["locked_by"].is_null());
}

#[tokio::test]
async fn register_vendor_empty_name_returns_400() {
    let (app, _rx) = setup();
    let response = app
        .oneshot(json_request("POST", "/vendors", vendor_body("  ", 19.07, 72.88)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_vendor_invalid_location_returns_400() {
    let (app, _rx) = setup();
    let response = app
        .oneshot(json_request("POST", "/vendors", vendor_body("Far Away", 123.0, 72.88)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_vendors_initially_empty() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/vendors")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn vendor_goes_offline_and_back_online() {
    let (app, _rx) = setup();
    let id = register_vendor(&app, "Meera Logistics", 19.07, 72.88).await;

    let res = app
        .clone()
        .oneshot(post_empty(&format!("/vendors/{id}/offline")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["vendor"]["status"], "offline");
    assert!(body["released_offer"].is_null());

    let res = app
        .oneshot(post_empty(&format!("/vendors/{id}/online")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "available");
}

#[tokio::test]
async fn update_vendor_location() {
    let (app, _rx) = setup();
    let id = register_vendor(&app, "Sharma Carriers", 19.07, 72.88).await;

    let res = app
        .oneshot(json_request(
            "PATCH",
            &format!("/vendors/{id}/location"),
            json!({ "location": { "lat": 18.52, "lng": 73.85 } }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["location"]["lat"], 18.52);
    assert_eq!(body["location"]["lng"], 73.85);
}

#[tokio::test]
async fn get_nonexistent_booking_returns_404() {
    let (app, _rx) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/bookings/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_booking_returns_priced_pending_booking() {
    let (app, _rx) = setup();
    let response = app
        .clone()
        .oneshot(json_request("POST", "/bookings", booking_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert!(body["assigned_vendor"].is_null());
    assert_eq!(body["fare"]["tier"], "regional");
    assert_eq!(body["fare"]["final_fare"], 500.0);

    let code = body["code"].as_str().unwrap();
    assert!(code.starts_with("FB"));
    assert_eq!(code.len(), 14);

    let res = app
        .oneshot(get_request(&format!("/bookings/code/{code}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["id"], body["id"]);
}

#[tokio::test]
async fn create_booking_without_dispatch_queue_stores_nothing() {
    let (state, rx) = new_state();
    drop(rx);
    let app = router(Arc::new(state));

    let response = app
        .clone()
        .oneshot(json_request("POST", "/bookings", booking_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let health = body_json(app.oneshot(get_request("/health")).await.unwrap()).await;
    assert_eq!(health["bookings"], 0);
}

#[tokio::test]
async fn create_booking_derives_distance_from_coordinates() {
    let (app, _rx) = setup();
    let mut request = booking_body();
    request.as_object_mut().unwrap().remove("distance_km");

    let response = app
        .oneshot(json_request("POST", "/bookings", request))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let distance = body["distance_km"].as_f64().unwrap();
    assert!(distance > 15.0 && distance < 25.0);
    assert_eq!(body["fare"]["tier"], "short-haul");
}

#[tokio::test]
async fn create_booking_without_vehicle_model_returns_400() {
    let (app, _rx) = setup();
    let mut request = booking_body();
    request["vehicle_model"] = json!(" ");

    let response = app
        .oneshot(json_request("POST", "/bookings", request))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn quote_uses_narrowest_tier_and_minimum() {
    let (app, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/quotes",
            json!({ "distance_km": 40.0, "weight_tons": 5.0 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["tier"], "regional");
    assert_eq!(body["raw_charge"], 480.0);
    assert_eq!(body["weight_surcharge"], 0.0);
    assert_eq!(body["final_fare"], 500.0);
    assert_eq!(body["fallback"], false);
}

#[tokio::test]
async fn quote_with_negative_distance_returns_400() {
    let (app, _rx) = setup();
    let response = app
        .oneshot(json_request("POST", "/quotes", json!({ "distance_km": -3.0 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pricing_tiers_are_listed() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/pricing/tiers")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn full_dispatch_flow() {
    let (state, rx) = new_state();
    let shared = Arc::new(state);
    tokio::spawn(run_dispatch_engine(shared.clone(), rx));
    let app = router(shared.clone());

    let vendor_id = register_vendor(&app, "Dispatch Dev", 19.08, 72.88).await;

    let res = app
        .clone()
        .oneshot(json_request("POST", "/bookings", booking_body()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let booking_id = body_json(res).await["id"].as_str().unwrap().to_string();

    let offers = wait_for_offers(&app, &booking_id, 1).await;
    let offer = &offers[0];
    assert_eq!(offer["vendor_id"], vendor_id);
    assert_eq!(offer["sequence"], 1);
    assert_eq!(offer["status"], "pending");
    assert_eq!(offer["terms"]["fare"], 500.0);
    let offer_id = offer["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(get_request(&format!("/vendors/{vendor_id}")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["status"], "offer_pending");

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/offers/{offer_id}/accept"),
            json!({ "vendor_id": vendor_id }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let resolution = body_json(res).await;
    assert_eq!(resolution["applied"], true);
    assert_eq!(resolution["offer"]["status"], "accepted");

    let res = app
        .clone()
        .oneshot(get_request(&format!("/bookings/{booking_id}")))
        .await
        .unwrap();
    let booking = body_json(res).await;
    assert_eq!(booking["status"], "confirmed");
    assert_eq!(booking["assigned_vendor"], vendor_id);

    let res = app
        .clone()
        .oneshot(post_empty(&format!("/bookings/{booking_id}/start")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["booking"]["status"], "in_transit");

    let res = app
        .clone()
        .oneshot(post_empty(&format!("/bookings/{booking_id}/complete")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["booking"]["status"], "completed");

    let res = app
        .oneshot(get_request(&format!("/vendors/{vendor_id}")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["status"], "available");
}

#[tokio::test]
async fn rejection_over_rest_fails_over_to_next_vendor() {
    let (state, rx) = new_state();
    let shared = Arc::new(state);
    tokio::spawn(run_dispatch_engine(shared.clone(), rx));
    let app = router(shared.clone());

    let near = register_vendor(&app, "Near Movers", 19.08, 72.88).await;
    let far = register_vendor(&app, "Far Movers", 19.15, 72.88).await;

    let res = app
        .clone()
        .oneshot(json_request("POST", "/bookings", booking_body()))
        .await
        .unwrap();
    let booking_id = body_json(res).await["id"].as_str().unwrap().to_string();

    let offers = wait_for_offers(&app, &booking_id, 1).await;
    assert_eq!(offers[0]["vendor_id"], near);
    let offer_id = offers[0]["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/offers/{offer_id}/accept"),
            json!({ "vendor_id": far }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/offers/{offer_id}/reject"),
            json!({ "vendor_id": near }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let resolution = body_json(res).await;
    assert_eq!(resolution["next"]["outcome"], "offer_issued");
    assert_eq!(resolution["next"]["vendor_id"], far);
    assert_eq!(resolution["next"]["sequence"], 2);

    let res = app
        .clone()
        .oneshot(post_empty(&format!("/bookings/{booking_id}/cancel")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cancelled = body_json(res).await;
    assert_eq!(cancelled["outcome"], "cancelled");
    assert_eq!(cancelled["booking"]["status"], "cancelled");

    let res = app
        .oneshot(get_request(&format!("/vendors/{far}/offers")))
        .await
        .unwrap();
    let far_offers = body_json(res).await;
    assert_eq!(far_offers[0]["status"], "rejected");
    assert_eq!(far_offers[0]["close_reason"], "booking_cancelled");
}
