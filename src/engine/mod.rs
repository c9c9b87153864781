pub mod bookings;
pub mod dispatch;
pub mod expiry;
pub mod lifecycle;
pub mod matcher;
pub mod pricing;
pub mod queue;
