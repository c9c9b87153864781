use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTier {
    pub name: String,
    pub per_km_rate: f64,
    pub distance_from: f64,
    /// `None` leaves the tier unbounded above.
    pub distance_to: Option<f64>,
    pub minimum_charge: f64,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Rate applied when no tier covers a distance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FallbackRate {
    pub per_km_rate: f64,
    pub minimum_charge: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WeightSurcharge {
    pub threshold_tons: f64,
    pub per_ton_rate: f64,
}

impl Default for WeightSurcharge {
    fn default() -> Self {
        Self {
            threshold_tons: 10.0,
            per_ton_rate: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FareQuote {
    pub distance_km: f64,
    pub weight_tons: f64,
    /// Name of the tier used, `None` when the fallback rate applied.
    pub tier: Option<String>,
    pub per_km_rate: f64,
    pub minimum_charge: f64,
    pub raw_charge: f64,
    pub weight_surcharge: f64,
    pub final_fare: f64,
    pub fallback: bool,
}
