use std::cmp::Ordering;

use crate::error::AppError;
use crate::models::pricing::{FallbackRate, FareQuote, PriceTier, WeightSurcharge};

/// Tiered distance pricing. Holds only read-only reference data, so quotes
/// can be computed concurrently without coordination.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    tiers: Vec<PriceTier>,
    fallback: Option<FallbackRate>,
    weight: WeightSurcharge,
}

impl PricingEngine {
    pub fn new(
        tiers: Vec<PriceTier>,
        fallback: Option<FallbackRate>,
        weight: WeightSurcharge,
    ) -> Result<Self, AppError> {
        for tier in &tiers {
            validate_tier(tier)?;
        }

        if let Some(rate) = &fallback {
            if !non_negative(rate.per_km_rate) || !non_negative(rate.minimum_charge) {
                return Err(AppError::Config(
                    "fallback rate and minimum charge must be non-negative".to_string(),
                ));
            }
        }

        if !non_negative(weight.threshold_tons) || !non_negative(weight.per_ton_rate) {
            return Err(AppError::Config(
                "weight threshold and per-ton rate must be non-negative".to_string(),
            ));
        }

        let engine = Self {
            tiers: tiers.into_iter().filter(|tier| tier.active).collect(),
            fallback,
            weight,
        };

        if engine.fallback.is_none() && !engine.covers_all_distances() {
            return Err(AppError::Config(
                "pricing tiers leave distances uncovered and no fallback rate is configured"
                    .to_string(),
            ));
        }

        Ok(engine)
    }

    pub fn default_tiers() -> Vec<PriceTier> {
        vec![
            tier("short-haul", 8.0, 0.0, Some(25.0), 200.0, 1),
            tier("regional", 12.0, 25.0, Some(100.0), 500.0, 2),
            tier("long-haul", 15.0, 100.0, None, 1500.0, 3),
        ]
    }

    pub fn tiers(&self) -> &[PriceTier] {
        &self.tiers
    }

    pub fn fallback(&self) -> Option<FallbackRate> {
        self.fallback
    }

    /// The narrowest applicable tier: among tiers containing the distance,
    /// the one with the highest lower bound. Equal lower bounds go to the
    /// lowest sort order.
    pub fn select_tier(&self, distance_km: f64) -> Option<&PriceTier> {
        self.tiers
            .iter()
            .filter(|tier| {
                tier.distance_from <= distance_km
                    && tier.distance_to.is_none_or(|upper| upper >= distance_km)
            })
            .max_by(|a, b| {
                a.distance_from
                    .total_cmp(&b.distance_from)
                    .then_with(|| b.sort_order.cmp(&a.sort_order))
                    .then_with(|| b.name.cmp(&a.name))
            })
    }

    pub fn calculate_fare(&self, distance_km: f64, weight_tons: f64) -> FareQuote {
        let distance_km = distance_km.max(0.0);
        let weight_tons = weight_tons.max(0.0);

        let (tier, per_km_rate, minimum_charge, fallback) = match self.select_tier(distance_km) {
            Some(tier) => (
                Some(tier.name.clone()),
                tier.per_km_rate,
                tier.minimum_charge,
                false,
            ),
            None => {
                let rate = self.fallback.unwrap_or(FallbackRate {
                    per_km_rate: 0.0,
                    minimum_charge: 0.0,
                });
                (None, rate.per_km_rate, rate.minimum_charge, true)
            }
        };

        let raw_charge = distance_km * per_km_rate;
        let weight_surcharge = if weight_tons > self.weight.threshold_tons {
            (weight_tons - self.weight.threshold_tons) * self.weight.per_ton_rate
        } else {
            0.0
        };
        let final_fare = (raw_charge + weight_surcharge).max(minimum_charge);

        FareQuote {
            distance_km: round2(distance_km),
            weight_tons,
            tier,
            per_km_rate: round2(per_km_rate),
            minimum_charge: round2(minimum_charge),
            raw_charge: round2(raw_charge),
            weight_surcharge: round2(weight_surcharge),
            final_fare: round2(final_fare),
            fallback,
        }
    }

    fn covers_all_distances(&self) -> bool {
        let mut sorted: Vec<&PriceTier> = self.tiers.iter().collect();
        sorted.sort_by(|a, b| a.distance_from.total_cmp(&b.distance_from));

        let mut reach = 0.0_f64;
        for tier in sorted {
            if tier.distance_from > reach {
                return false;
            }
            match tier.distance_to {
                None => return true,
                Some(upper) => reach = reach.max(upper),
            }
        }

        false
    }
}

fn tier(
    name: &str,
    per_km_rate: f64,
    distance_from: f64,
    distance_to: Option<f64>,
    minimum_charge: f64,
    sort_order: i32,
) -> PriceTier {
    PriceTier {
        name: name.to_string(),
        per_km_rate,
        distance_from,
        distance_to,
        minimum_charge,
        sort_order,
        active: true,
    }
}

fn validate_tier(tier: &PriceTier) -> Result<(), AppError> {
    if tier.name.trim().is_empty() {
        return Err(AppError::Config("pricing tier name cannot be empty".to_string()));
    }

    if !non_negative(tier.per_km_rate)
        || !non_negative(tier.minimum_charge)
        || !non_negative(tier.distance_from)
    {
        return Err(AppError::Config(format!(
            "pricing tier {} has a negative rate, minimum or lower bound",
            tier.name
        )));
    }

    if let Some(upper) = tier.distance_to {
        if upper.partial_cmp(&tier.distance_from) != Some(Ordering::Greater) {
            return Err(AppError::Config(format!(
                "pricing tier {} upper bound must exceed its lower bound",
                tier.name
            )));
        }
    }

    Ok(())
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
