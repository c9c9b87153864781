use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::vendor::{GeoPoint, Vendor, VendorLock, VendorStatus};

/// Availability records for every vendor. This is the only state shared
/// between the dispatch flows of different bookings, so every mutation is a
/// single conditional update under the entry's shard lock.
#[derive(Default)]
pub struct VendorAvailabilityStore {
    vendors: DashMap<Uuid, Vendor>,
}

impl VendorAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, vendor: Vendor) {
        self.vendors.insert(vendor.id, vendor);
    }

    pub fn get(&self, vendor_id: &Uuid) -> Option<Vendor> {
        self.vendors.get(vendor_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.vendors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Vendor> {
        self.vendors
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn locked_count(&self) -> usize {
        self.vendors
            .iter()
            .filter(|entry| entry.value().locked_by.is_some())
            .count()
    }

    /// Compare-and-set from `available` to `offer-pending`. Never waits: a
    /// vendor that is not eligible right now simply yields `false`.
    pub fn try_lock(&self, vendor_id: &Uuid, lock: VendorLock) -> bool {
        let Some(mut vendor) = self.vendors.get_mut(vendor_id) else {
            return false;
        };

        if !vendor.can_accept_bookings() || vendor.locked_by.is_some() {
            return false;
        }

        vendor.status = VendorStatus::OfferPending;
        vendor.locked_by = Some(lock);
        vendor.updated_at = Utc::now();
        true
    }

    /// Releases the lock held by `offer_id`. Returns `false` without touching
    /// the record when the vendor is unlocked or locked by another offer.
    pub fn unlock(&self, vendor_id: &Uuid, offer_id: Uuid) -> bool {
        let Some(mut vendor) = self.vendors.get_mut(vendor_id) else {
            return false;
        };

        if vendor.locked_by.map(|held| held.offer_id) != Some(offer_id) {
            return false;
        }

        vendor.locked_by = None;
        if vendor.status == VendorStatus::OfferPending {
            vendor.status = VendorStatus::Available;
        }
        vendor.updated_at = Utc::now();
        true
    }

    /// Marks the vendor offline and drops any lock it holds. Returns the
    /// vendor and the released lock, whose offer the caller must close.
    pub fn set_offline(
        &self,
        vendor_id: &Uuid,
    ) -> Result<(Vendor, Option<VendorLock>), AppError> {
        let mut vendor = self
            .vendors
            .get_mut(vendor_id)
            .ok_or_else(|| AppError::NotFound(format!("vendor {vendor_id} not found")))?;

        let released = vendor.locked_by.take();
        vendor.status = VendorStatus::Offline;
        vendor.updated_at = Utc::now();

        Ok((vendor.clone(), released))
    }

    pub fn set_online(&self, vendor_id: &Uuid) -> Result<Vendor, AppError> {
        let mut vendor = self
            .vendors
            .get_mut(vendor_id)
            .ok_or_else(|| AppError::NotFound(format!("vendor {vendor_id} not found")))?;

        if vendor.status == VendorStatus::Offline {
            vendor.status = VendorStatus::Available;
            vendor.updated_at = Utc::now();
        }

        Ok(vendor.clone())
    }

    pub fn update_location(&self, vendor_id: &Uuid, location: GeoPoint) -> Result<Vendor, AppError> {
        let mut vendor = self
            .vendors
            .get_mut(vendor_id)
            .ok_or_else(|| AppError::NotFound(format!("vendor {vendor_id} not found")))?;

        vendor.location = Some(location);
        vendor.updated_at = Utc::now();

        Ok(vendor.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use uuid::Uuid;

    use super::VendorAvailabilityStore;
    use crate::models::vendor::{GeoPoint, Vendor, VendorLock, VendorStatus};

    fn lock(offer_id: Uuid) -> VendorLock {
        VendorLock {
            offer_id,
            booking_id: Uuid::new_v4(),
        }
    }

    fn vendor(id_seed: u128) -> Vendor {
        Vendor {
            id: Uuid::from_u128(id_seed),
            name: "test-vendor".to_string(),
            vehicle_model: "tata-407".to_string(),
            location: Some(GeoPoint {
                lat: 19.07,
                lng: 72.87,
            }),
            status: VendorStatus::Available,
            approved: true,
            listed: true,
            locked_by: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn lock_flips_status_and_unlock_restores_it() {
        let store = VendorAvailabilityStore::new();
        let v = vendor(1);
        store.insert(v.clone());

        let offer = Uuid::new_v4();
        assert!(store.try_lock(&v.id, lock(offer)));
        assert_eq!(store.get(&v.id).unwrap().status, VendorStatus::OfferPending);
        assert!(!store.try_lock(&v.id, lock(Uuid::new_v4())));

        assert!(store.unlock(&v.id, offer));
        assert_eq!(store.get(&v.id).unwrap().status, VendorStatus::Available);
    }

    #[test]
    fn unlock_is_idempotent_and_ignores_foreign_offers() {
        let store = VendorAvailabilityStore::new();
        let v = vendor(2);
        store.insert(v.clone());

        let offer = Uuid::new_v4();
        assert!(store.try_lock(&v.id, lock(offer)));
        assert!(!store.unlock(&v.id, Uuid::new_v4()));
        assert!(store.unlock(&v.id, offer));
        assert!(!store.unlock(&v.id, offer));
        assert_eq!(store.get(&v.id).unwrap().status, VendorStatus::Available);
    }

    #[test]
    fn unapproved_or_unlisted_vendor_cannot_be_locked() {
        let store = VendorAvailabilityStore::new();
        let mut unapproved = vendor(3);
        unapproved.approved = false;
        let mut unlisted = vendor(4);
        unlisted.listed = false;
        store.insert(unapproved.clone());
        store.insert(unlisted.clone());

        assert!(!store.try_lock(&unapproved.id, lock(Uuid::new_v4())));
        assert!(!store.try_lock(&unlisted.id, lock(Uuid::new_v4())));
    }

    #[test]
    fn set_offline_releases_lock_and_reports_offer() {
        let store = VendorAvailabilityStore::new();
        let v = vendor(5);
        store.insert(v.clone());

        let offer = Uuid::new_v4();
        assert!(store.try_lock(&v.id, lock(offer)));

        let (updated, released) = store.set_offline(&v.id).unwrap();
        assert_eq!(updated.status, VendorStatus::Offline);
        assert_eq!(released.map(|held| held.offer_id), Some(offer));
        assert!(!store.unlock(&v.id, offer));
        assert!(!store.try_lock(&v.id, lock(Uuid::new_v4())));

        let online = store.set_online(&v.id).unwrap();
        assert_eq!(online.status, VendorStatus::Available);
    }

    #[test]
    fn concurrent_lock_attempts_have_a_single_winner() {
        let store = Arc::new(VendorAvailabilityStore::new());
        let vendor_id = vendor(6).id;
        store.insert(vendor(6));
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let winners = winners.clone();
                std::thread::spawn(move || {
                    if store.try_lock(&vendor_id, lock(Uuid::new_v4())) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(store.locked_count(), 1);
    }
}
