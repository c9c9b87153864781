use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use freight_dispatch::api;
use freight_dispatch::config::Config;
use freight_dispatch::engine::dispatch::run_dispatch_engine;
use freight_dispatch::engine::expiry::run_expiry_sweeper;
use freight_dispatch::error::AppError;
use freight_dispatch::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }

    let pricing = config.pricing_engine()?;
    tracing::info!(
        tiers = pricing.tiers().len(),
        fallback = pricing.fallback().is_some(),
        radius_km = config.dispatch.radius_km,
        offer_window_secs = config.dispatch.offer_window.as_secs(),
        "dispatch configuration loaded"
    );

    let (app_state, booking_rx) = AppState::new(
        config.dispatch,
        pricing,
        config.booking_queue_size,
        config.event_buffer_size,
    );
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_dispatch_engine(shared_state.clone(), booking_rx));
    tokio::spawn(run_expiry_sweeper(
        shared_state.clone(),
        config.expiry_sweep_interval,
    ));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
