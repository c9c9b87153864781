//! Sequential offer dispatch.
//!
//! A booking is offered to one vendor at a time. Every way an offer can end
//! without acceptance (rejection, expiry, the vendor going offline) closes
//! the offer, releases the vendor and dispatches again, skipping every
//! vendor the booking has already been offered to.
//!
//! All offer-affecting work for a booking runs under that booking's guard,
//! so at most one offer is pending per booking. The vendor store is the only
//! state contended across bookings; it is claimed with a non-blocking
//! compare-and-set and a lost race just moves on to the next candidate.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::BookingEvent;
use crate::engine::matcher::{find_candidates, Candidate};
use crate::error::AppError;
use crate::models::booking::{Booking, BookingStatus};
use crate::models::event::DispatchEvent;
use crate::models::offer::{CloseReason, Offer, OfferStatus, OfferTerms};
use crate::models::vendor::{Vendor, VendorLock};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    OfferIssued {
        offer_id: Uuid,
        vendor_id: Uuid,
        sequence: u32,
        distance_km: f64,
    },
    NoVendorAvailable {
        offers_made: u32,
    },
    /// An offer is already pending; nothing new was created.
    InProgress {
        offer_id: Uuid,
    },
    /// The booking is past the point where dispatch applies.
    Skipped {
        status: BookingStatus,
    },
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::OfferIssued { .. } => "offer_issued",
            DispatchOutcome::NoVendorAvailable { .. } => "no_vendor",
            DispatchOutcome::InProgress { .. } => "in_progress",
            DispatchOutcome::Skipped { .. } => "skipped",
        }
    }
}

/// Result of closing an offer. `applied` is false when the offer had
/// already left `pending` and the call changed nothing.
#[derive(Debug, Clone, Serialize)]
pub struct OfferResolution {
    pub offer: Offer,
    pub applied: bool,
    pub next: Option<DispatchOutcome>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VendorDecision {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled {
        booking: Booking,
        released_offer: Option<Uuid>,
    },
    AlreadyClosed {
        booking: Booking,
    },
    /// A vendor already accepted; cancelling now goes through the
    /// post-confirmation flow.
    RequiresPostConfirmationCancel {
        booking: Booking,
    },
}

pub async fn run_dispatch_engine(state: Arc<AppState>, mut booking_rx: mpsc::Receiver<Uuid>) {
    info!("dispatch engine started");

    while let Some(booking_id) = booking_rx.recv().await {
        state.metrics.bookings_in_queue.dec();

        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = dispatch(&state, booking_id).await {
                error!(booking_id = %booking_id, error = %err, "failed to dispatch booking");
            }
        });
    }

    warn!("dispatch engine stopped: queue channel closed");
}

/// Offers the booking to the nearest eligible vendor it has not been
/// offered to yet. Safe to call repeatedly.
pub async fn dispatch(state: &Arc<AppState>, booking_id: Uuid) -> Result<DispatchOutcome, AppError> {
    let outcome = {
        let guard = state.booking_guard(booking_id);
        let _held = guard.lock().await;
        dispatch_locked(state, booking_id)
    };

    state.release_booking_guard(&booking_id);
    outcome
}

/// Reopens a booking that ran out of vendors and dispatches it again.
/// Vendors offered earlier stay excluded.
pub async fn retry_dispatch(
    state: &Arc<AppState>,
    booking_id: Uuid,
) -> Result<DispatchOutcome, AppError> {
    let guard = state.booking_guard(booking_id);
    let _held = guard.lock().await;

    let booking = state
        .booking(&booking_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

    if booking.status == BookingStatus::NoVendorAvailable {
        transition_booking(state, booking_id, BookingEvent::RetryRequested)?;
    }

    dispatch_locked(state, booking_id)
}

pub async fn respond_to_offer(
    state: &Arc<AppState>,
    offer_id: Uuid,
    vendor_id: Uuid,
    decision: VendorDecision,
) -> Result<OfferResolution, AppError> {
    let offer = state
        .offer(&offer_id)
        .ok_or_else(|| AppError::NotFound(format!("offer {offer_id} not found")))?;

    if offer.vendor_id != vendor_id {
        return Err(AppError::Forbidden(format!(
            "offer {offer_id} was not made to vendor {vendor_id}"
        )));
    }

    let guard = state.booking_guard(offer.booking_id);
    let _held = guard.lock().await;

    match decision {
        VendorDecision::Accept => accept_locked(state, offer_id),
        VendorDecision::Reject => close_and_redispatch(state, offer_id, CloseReason::VendorRejected),
    }
}

pub async fn expire_offer(state: &Arc<AppState>, offer_id: Uuid) -> Result<OfferResolution, AppError> {
    expire_offer_at(state, offer_id, Utc::now()).await
}

/// Expires the offer if it is still pending at `now`. A timer that fires
/// early, or after the vendor already answered, changes nothing.
pub async fn expire_offer_at(
    state: &Arc<AppState>,
    offer_id: Uuid,
    now: DateTime<Utc>,
) -> Result<OfferResolution, AppError> {
    let booking_id = state
        .offer(&offer_id)
        .map(|offer| offer.booking_id)
        .ok_or_else(|| AppError::NotFound(format!("offer {offer_id} not found")))?;

    let guard = state.booking_guard(booking_id);
    let _held = guard.lock().await;

    let offer = state
        .offer(&offer_id)
        .ok_or_else(|| AppError::NotFound(format!("offer {offer_id} not found")))?;

    if offer.status == OfferStatus::Pending && now < offer.expires_at {
        debug!(offer_id = %offer_id, expires_at = %offer.expires_at, "expiry check fired early");
        return Ok(OfferResolution {
            offer,
            applied: false,
            next: None,
        });
    }

    close_and_redispatch(state, offer_id, CloseReason::Expired)
}

/// Takes the vendor offline. A pending offer held by the vendor is closed
/// as a rejection and its booking moves on to the next vendor.
pub async fn vendor_offline(
    state: &Arc<AppState>,
    vendor_id: Uuid,
) -> Result<(Vendor, Option<OfferResolution>), AppError> {
    let (vendor, released) = state.vendors.set_offline(&vendor_id)?;
    state.metrics.vendors_locked.set(state.vendors.locked_count() as i64);
    info!(vendor_id = %vendor_id, "vendor went offline");

    let Some(lock) = released else {
        return Ok((vendor, None));
    };

    let guard = state.booking_guard(lock.booking_id);
    let _held = guard.lock().await;

    let resolution = close_and_redispatch(state, lock.offer_id, CloseReason::VendorOffline)?;
    Ok((vendor, Some(resolution)))
}

pub async fn cancel_booking(state: &Arc<AppState>, booking_id: Uuid) -> Result<CancelOutcome, AppError> {
    let outcome = {
        let guard = state.booking_guard(booking_id);
        let _held = guard.lock().await;
        cancel_locked(state, booking_id)
    };

    state.release_booking_guard(&booking_id);
    outcome
}

fn cancel_locked(state: &Arc<AppState>, booking_id: Uuid) -> Result<CancelOutcome, AppError> {
    let booking = state
        .booking(&booking_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

    match booking.status {
        BookingStatus::Confirmed | BookingStatus::InTransit => {
            info!(booking_id = %booking_id, status = booking.status.as_str(), "cancel needs post-confirmation flow");
            return Ok(CancelOutcome::RequiresPostConfirmationCancel { booking });
        }
        status if status.is_terminal() => {
            debug!(booking_id = %booking_id, status = status.as_str(), "cancel on closed booking ignored");
            return Ok(CancelOutcome::AlreadyClosed { booking });
        }
        _ => {}
    }

    let pending = state
        .offers_for_booking(&booking_id)
        .into_iter()
        .find(|offer| offer.status == OfferStatus::Pending);

    let released_offer = match pending {
        Some(offer) => {
            close_offer_locked(state, offer.id, CloseReason::BookingCancelled)?;
            Some(offer.id)
        }
        None => None,
    };

    let booking = transition_booking(state, booking_id, BookingEvent::CancelRequested)?
        .ok_or_else(|| AppError::Internal(format!("booking {booking_id} could not be cancelled")))?;

    Ok(CancelOutcome::Cancelled {
        booking,
        released_offer,
    })
}

/// Caller must hold the booking guard.
fn dispatch_locked(state: &Arc<AppState>, booking_id: Uuid) -> Result<DispatchOutcome, AppError> {
    let start = Instant::now();
    let result = run_dispatch(state, booking_id);

    let label = match &result {
        Ok(outcome) => outcome.label(),
        Err(_) => "error",
    };
    state
        .metrics
        .dispatch_latency_seconds
        .with_label_values(&[label])
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .dispatch_outcomes_total
        .with_label_values(&[label])
        .inc();

    result
}

fn run_dispatch(state: &Arc<AppState>, booking_id: Uuid) -> Result<DispatchOutcome, AppError> {
    let booking = state
        .booking(&booking_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

    match booking.status {
        BookingStatus::Pending => {
            transition_booking(state, booking_id, BookingEvent::DispatchStarted)?;
        }
        BookingStatus::SearchingVendor => {}
        status => {
            debug!(booking_id = %booking_id, status = status.as_str(), "dispatch skipped");
            return Ok(DispatchOutcome::Skipped { status });
        }
    }

    let offers = state.offers_for_booking(&booking_id);
    if let Some(active) = offers.iter().find(|offer| offer.status == OfferStatus::Pending) {
        debug!(booking_id = %booking_id, offer_id = %active.id, "offer already pending");
        return Ok(DispatchOutcome::InProgress {
            offer_id: active.id,
        });
    }

    let excluded: HashSet<Uuid> = offers.iter().map(|offer| offer.vendor_id).collect();
    let pool = state.vendors.snapshot();
    let candidates = find_candidates(
        &booking.pickup.location,
        &booking.vehicle_model,
        state.settings.radius_km,
        &excluded,
        &pool,
    );

    let window = chrono::Duration::from_std(state.settings.offer_window)
        .map_err(|err| AppError::Internal(format!("offer window out of range: {err}")))?;
    let sequence = offers.len() as u32 + 1;
    for candidate in &candidates {
        let lock = VendorLock {
            offer_id: Uuid::new_v4(),
            booking_id,
        };

        if !state.vendors.try_lock(&candidate.vendor_id, lock) {
            state.metrics.vendor_lock_conflicts_total.inc();
            debug!(
                booking_id = %booking_id,
                vendor_id = %candidate.vendor_id,
                "vendor claimed by another booking; trying next candidate"
            );
            continue;
        }

        let offer = issue_offer(state, &booking, lock.offer_id, candidate, sequence, window);
        return Ok(DispatchOutcome::OfferIssued {
            offer_id: offer.id,
            vendor_id: offer.vendor_id,
            sequence: offer.sequence,
            distance_km: offer.distance_to_pickup_km,
        });
    }

    transition_booking(state, booking_id, BookingEvent::NoCandidates)?;
    info!(
        booking_id = %booking_id,
        code = %booking.code,
        offers_made = offers.len(),
        "no vendor available"
    );

    Ok(DispatchOutcome::NoVendorAvailable {
        offers_made: offers.len() as u32,
    })
}

fn issue_offer(
    state: &Arc<AppState>,
    booking: &Booking,
    offer_id: Uuid,
    candidate: &Candidate,
    sequence: u32,
    window: chrono::Duration,
) -> Offer {
    let now = Utc::now();

    let offer = Offer {
        id: offer_id,
        booking_id: booking.id,
        booking_code: booking.code.clone(),
        vendor_id: candidate.vendor_id,
        sequence,
        distance_to_pickup_km: candidate.distance_km,
        created_at: now,
        expires_at: now + window,
        responded_at: None,
        status: OfferStatus::Pending,
        close_reason: None,
        terms: OfferTerms {
            pickup_time: booking.pickup_time,
            pickup_address: booking.pickup.address.clone(),
            dropoff_address: booking.dropoff.address.clone(),
            vehicle_model: booking.vehicle_model.clone(),
            distance_km: booking.distance_km,
            fare: booking.fare.final_fare,
        },
    };

    state.offers.insert(offer.id, offer.clone());
    state
        .booking_offers
        .entry(booking.id)
        .or_default()
        .push(offer.id);
    state.expiry.schedule(state.clone(), offer.id, offer.expires_at);

    state.metrics.offers_total.with_label_values(&["created"]).inc();
    state.metrics.vendors_locked.set(state.vendors.locked_count() as i64);

    info!(
        booking_id = %booking.id,
        offer_id = %offer.id,
        vendor_id = %offer.vendor_id,
        sequence = offer.sequence,
        distance_km = offer.distance_to_pickup_km,
        "offer issued"
    );
    state.publish(DispatchEvent::OfferCreated {
        offer: offer.clone(),
    });

    offer
}

fn accept_locked(state: &Arc<AppState>, offer_id: Uuid) -> Result<OfferResolution, AppError> {
    let offer = state
        .offer(&offer_id)
        .ok_or_else(|| AppError::NotFound(format!("offer {offer_id} not found")))?;

    if offer.status == OfferStatus::Pending {
        let status = state
            .booking(&offer.booking_id)
            .map(|booking| booking.status)
            .ok_or_else(|| AppError::NotFound(format!("booking {} not found", offer.booking_id)))?;

        if status != BookingStatus::SearchingVendor {
            return Err(AppError::Internal(format!(
                "offer {offer_id} pending on booking in state {}",
                status.as_str()
            )));
        }
    }

    let (offer, applied) = close_offer_locked(state, offer_id, CloseReason::Accepted)?;
    if applied {
        transition_booking(
            state,
            offer.booking_id,
            BookingEvent::OfferAccepted {
                vendor_id: offer.vendor_id,
            },
        )?;
    }

    Ok(OfferResolution {
        offer,
        applied,
        next: None,
    })
}

fn close_and_redispatch(
    state: &Arc<AppState>,
    offer_id: Uuid,
    reason: CloseReason,
) -> Result<OfferResolution, AppError> {
    let (offer, applied) = close_offer_locked(state, offer_id, reason)?;

    let next = if applied {
        Some(dispatch_locked(state, offer.booking_id)?)
    } else {
        None
    };

    Ok(OfferResolution {
        offer,
        applied,
        next,
    })
}

/// First caller to see the offer `pending` closes it and releases the
/// vendor; later callers get `applied == false` and nothing changes.
fn close_offer_locked(
    state: &AppState,
    offer_id: Uuid,
    reason: CloseReason,
) -> Result<(Offer, bool), AppError> {
    let (offer, applied) = {
        let mut offer = state
            .offers
            .get_mut(&offer_id)
            .ok_or_else(|| AppError::NotFound(format!("offer {offer_id} not found")))?;
        let applied = offer.close(reason, Utc::now());
        (offer.clone(), applied)
    };

    if !applied {
        debug!(
            offer_id = %offer_id,
            status = ?offer.status,
            reason = reason.as_str(),
            "offer already closed; ignoring"
        );
        return Ok((offer, false));
    }

    state.expiry.cancel(&offer_id);
    state.vendors.unlock(&offer.vendor_id, offer_id);

    state
        .metrics
        .offers_total
        .with_label_values(&[reason.as_str()])
        .inc();
    state.metrics.vendors_locked.set(state.vendors.locked_count() as i64);

    info!(
        booking_id = %offer.booking_id,
        offer_id = %offer.id,
        vendor_id = %offer.vendor_id,
        sequence = offer.sequence,
        reason = reason.as_str(),
        "offer closed"
    );
    state.publish(DispatchEvent::OfferClosed {
        offer_id: offer.id,
        booking_id: offer.booking_id,
        vendor_id: offer.vendor_id,
        status: offer.status,
        reason,
    });

    Ok((offer, true))
}

/// Applies a booking event. Illegal transitions are logged and return
/// `None`.
pub(crate) fn transition_booking(
    state: &AppState,
    booking_id: Uuid,
    event: BookingEvent,
) -> Result<Option<Booking>, AppError> {
    let (from, updated) = {
        let mut booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;
        let from = booking.status;
        let applied = booking.apply(event, Utc::now());
        (from, applied.then(|| booking.clone()))
    };

    let Some(booking) = updated else {
        warn!(
            booking_id = %booking_id,
            status = from.as_str(),
            event = ?event,
            "ignored illegal booking transition"
        );
        return Ok(None);
    };

    info!(
        booking_id = %booking_id,
        code = %booking.code,
        from = from.as_str(),
        to = booking.status.as_str(),
        "booking status changed"
    );
    state.publish(DispatchEvent::BookingUpdated {
        booking_id,
        code: booking.code.clone(),
        status: booking.status,
        assigned_vendor: booking.assigned_vendor,
    });

    Ok(Some(booking))
}
