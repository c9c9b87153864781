use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub async fn enqueue_booking(state: &AppState, booking_id: Uuid) -> Result<(), AppError> {
    state.metrics.bookings_in_queue.inc();

    if let Err(err) = state.booking_tx.send(booking_id).await {
        state.metrics.bookings_in_queue.dec();
        return Err(AppError::Internal(format!("booking queue send failed: {err}")));
    }

    Ok(())
}
