use std::env;
use std::time::Duration;

use crate::engine::matcher::DEFAULT_RADIUS_KM;
use crate::engine::pricing::PricingEngine;
use crate::error::AppError;
use crate::models::pricing::{FallbackRate, PriceTier, WeightSurcharge};

/// Knobs read by the dispatch coordinator on every attempt.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub radius_km: f64,
    pub offer_window: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            radius_km: DEFAULT_RADIUS_KM,
            offer_window: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub booking_queue_size: usize,
    pub event_buffer_size: usize,
    pub dispatch: DispatchSettings,
    pub expiry_sweep_interval: Duration,
    pub pricing_tiers: Vec<PriceTier>,
    pub fallback_rate: Option<FallbackRate>,
    pub weight_surcharge: WeightSurcharge,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let pricing_tiers = match env::var("PRICING_TIERS_PATH") {
            Ok(path) => load_tiers(&path)?,
            Err(_) => PricingEngine::default_tiers(),
        };

        let fallback_enabled = env::var("PRICING_FALLBACK")
            .map(|raw| !matches!(raw.trim().to_ascii_lowercase().as_str(), "off" | "false" | "0"))
            .unwrap_or(true);
        let fallback_rate = if fallback_enabled {
            Some(FallbackRate {
                per_km_rate: parse_or_default("FALLBACK_PER_KM_RATE", 10.0)?,
                minimum_charge: parse_or_default("FALLBACK_MINIMUM_CHARGE", 250.0)?,
            })
        } else {
            None
        };

        let radius_km: f64 = parse_or_default("DISPATCH_RADIUS_KM", DEFAULT_RADIUS_KM)?;
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(AppError::Config("DISPATCH_RADIUS_KM must be > 0".to_string()));
        }

        let offer_window_secs: u64 = parse_or_default("OFFER_WINDOW_SECS", 600)?;
        if offer_window_secs == 0 {
            return Err(AppError::Config("OFFER_WINDOW_SECS must be > 0".to_string()));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")),
            booking_queue_size: parse_or_default("BOOKING_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            dispatch: DispatchSettings {
                radius_km,
                offer_window: Duration::from_secs(offer_window_secs),
            },
            expiry_sweep_interval: Duration::from_secs(parse_or_default("EXPIRY_SWEEP_SECS", 30)?),
            pricing_tiers,
            fallback_rate,
            weight_surcharge: WeightSurcharge {
                threshold_tons: parse_or_default("WEIGHT_THRESHOLD_TONS", 10.0)?,
                per_ton_rate: parse_or_default("PER_TON_RATE", 50.0)?,
            },
        })
    }

    /// Fails when the tier table cannot price every distance and no
    /// fallback is configured.
    pub fn pricing_engine(&self) -> Result<PricingEngine, AppError> {
        PricingEngine::new(
            self.pricing_tiers.clone(),
            self.fallback_rate,
            self.weight_surcharge,
        )
    }
}

fn load_tiers(path: &str) -> Result<Vec<PriceTier>, AppError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| AppError::Config(format!("failed to read {path}: {err}")))?;

    serde_json::from_str(&raw)
        .map_err(|err| AppError::Config(format!("invalid pricing tiers in {path}: {err}")))
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Config(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
