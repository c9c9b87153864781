pub mod booking;
pub mod event;
pub mod offer;
pub mod pricing;
pub mod vendor;
