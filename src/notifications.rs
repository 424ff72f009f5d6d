use std::sync::Arc;

use crate::store::Store;

pub const BOOKING_RECEIVED: &str = "Booking Received";
pub const DETAILER_FOUND: &str = "Detailer Found";
pub const BOOKING_CONFIRMED: &str = "Booking Confirmed";
pub const SERVICE_COMPLETED: &str = "Service Completed";
pub const BOOKING_CANCELLED: &str = "Booking Cancelled";

/// Writes messages to the users' inbox. Delivery is attempted once; a failure
/// is logged and never reaches the caller.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn Store>,
}

impl Notifier {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Notifier { store }
    }

    pub async fn notify(&self, user_id: i32, title: &str, message: &str) {
        match self.store.insert_notification(user_id, title, message).await {
            Ok(()) => info!("Notification for user {}: {}", user_id, title),
            Err(e) => warn!(
                "Failed to store notification '{}' for user {}: {}",
                title, user_id, e
            ),
        }
    }
}
