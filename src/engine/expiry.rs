use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::AbortHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::dispatch::{expire_offer, expire_offer_at};
use crate::models::offer::OfferStatus;
use crate::state::AppState;

/// One sleeping task per pending offer. Firing twice, late, or not at all
/// is tolerated: expiry only applies to an offer still `pending` past its
/// deadline, and the sweeper picks up anything a timer missed.
#[derive(Default)]
pub struct ExpiryScheduler {
    timers: DashMap<Uuid, AbortHandle>,
}

impl ExpiryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, state: Arc<AppState>, offer_id: Uuid, at: DateTime<Utc>) {
        let task = tokio::spawn(async move {
            while let Ok(remaining) = (at - Utc::now()).to_std() {
                if remaining.is_zero() {
                    break;
                }
                sleep(remaining).await;
            }
            state.expiry.timers.remove(&offer_id);

            if let Err(err) = expire_offer(&state, offer_id).await {
                error!(offer_id = %offer_id, error = %err, "offer expiry check failed");
            }
        });

        if let Some(previous) = self.timers.insert(offer_id, task.abort_handle()) {
            previous.abort();
        }
    }

    pub fn cancel(&self, offer_id: &Uuid) {
        if let Some((_, timer)) = self.timers.remove(offer_id) {
            timer.abort();
        }
    }

    pub fn scheduled(&self) -> usize {
        self.timers.len()
    }
}

pub async fn run_expiry_sweeper(state: Arc<AppState>, every: Duration) {
    info!(interval_secs = every.as_secs(), "expiry sweeper started");

    let mut ticker = interval(every.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let swept = sweep_expired(&state, Utc::now()).await;
        if swept > 0 {
            warn!(swept, "expired offers missed by their timers");
        }
    }
}

/// Expires every pending offer whose deadline is at or before `now`.
pub async fn sweep_expired(state: &Arc<AppState>, now: DateTime<Utc>) -> usize {
    let overdue: Vec<Uuid> = state
        .offers
        .iter()
        .filter(|entry| {
            let offer = entry.value();
            offer.status == OfferStatus::Pending && offer.expires_at <= now
        })
        .map(|entry| *entry.key())
        .collect();

    let mut swept = 0;
    for offer_id in overdue {
        match expire_offer_at(state, offer_id, now).await {
            Ok(resolution) if resolution.applied => swept += 1,
            Ok(_) => debug!(offer_id = %offer_id, "offer closed before sweep"),
            Err(err) => error!(offer_id = %offer_id, error = %err, "sweep failed to expire offer"),
        }
    }

    swept
}
