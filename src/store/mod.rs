pub mod vendors;

pub use vendors::VendorAvailabilityStore;
