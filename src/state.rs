use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, Mutex};
use uuid::Uuid;

use crate::config::DispatchSettings;
use crate::engine::expiry::ExpiryScheduler;
use crate::engine::pricing::PricingEngine;
use crate::models::booking::Booking;
use crate::models::event::DispatchEvent;
use crate::models::offer::Offer;
use crate::observability::metrics::Metrics;
use crate::store::VendorAvailabilityStore;

pub struct AppState {
    pub settings: DispatchSettings,
    pub pricing: PricingEngine,
    pub vendors: VendorAvailabilityStore,
    pub bookings: DashMap<Uuid, Booking>,
    pub booking_codes: DashMap<String, Uuid>,
    pub offers: DashMap<Uuid, Offer>,
    /// Offer ids per booking, in sequence order.
    pub booking_offers: DashMap<Uuid, Vec<Uuid>>,
    booking_guards: DashMap<Uuid, Arc<Mutex<()>>>,
    pub expiry: ExpiryScheduler,
    pub booking_tx: mpsc::Sender<Uuid>,
    pub events_tx: broadcast::Sender<DispatchEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        settings: DispatchSettings,
        pricing: PricingEngine,
        booking_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<Uuid>) {
        let (booking_tx, booking_rx) = mpsc::channel(booking_queue_size);
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        (
            Self {
                settings,
                pricing,
                vendors: VendorAvailabilityStore::new(),
                bookings: DashMap::new(),
                booking_codes: DashMap::new(),
                offers: DashMap::new(),
                booking_offers: DashMap::new(),
                booking_guards: DashMap::new(),
                expiry: ExpiryScheduler::new(),
                booking_tx,
                events_tx,
                metrics: Metrics::new(),
            },
            booking_rx,
        )
    }

    /// Serialises every offer-affecting operation on one booking.
    pub fn booking_guard(&self, booking_id: Uuid) -> Arc<Mutex<()>> {
        self.booking_guards.entry(booking_id).or_default().clone()
    }

    /// Drops the guard of a closed or unknown booking once no task holds it.
    /// Call after releasing the guard.
    pub fn release_booking_guard(&self, booking_id: &Uuid) {
        if self
            .booking(booking_id)
            .is_some_and(|booking| !booking.status.is_terminal())
        {
            return;
        }

        self.booking_guards
            .remove_if(booking_id, |_, guard| Arc::strong_count(guard) == 1);
    }

    pub fn guarded_bookings(&self) -> usize {
        self.booking_guards.len()
    }

    pub fn booking(&self, booking_id: &Uuid) -> Option<Booking> {
        self.bookings.get(booking_id).map(|entry| entry.value().clone())
    }

    pub fn offer(&self, offer_id: &Uuid) -> Option<Offer> {
        self.offers.get(offer_id).map(|entry| entry.value().clone())
    }

    pub fn offers_for_booking(&self, booking_id: &Uuid) -> Vec<Offer> {
        let ids = self
            .booking_offers
            .get(booking_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        ids.iter().filter_map(|id| self.offer(id)).collect()
    }

    pub fn offers_for_vendor(&self, vendor_id: &Uuid) -> Vec<Offer> {
        let mut offers: Vec<Offer> = self
            .offers
            .iter()
            .filter(|entry| entry.value().vendor_id == *vendor_id)
            .map(|entry| entry.value().clone())
            .collect();
        offers.sort_by_key(|offer| offer.created_at);
        offers
    }

    pub fn publish(&self, event: DispatchEvent) {
        let _ = self.events_tx.send(event);
    }
}
