use chrono::{NaiveDate, NaiveTime};

use crate::error::AppError;
use crate::store::Store;

/// Times already taken on `date`, sorted and without duplicates. Cancelled
/// bookings free their slot. Capacity is left to the caller.
pub async fn occupied_slots(store: &dyn Store, date: NaiveDate) -> Result<Vec<NaiveTime>, AppError> {
    let mut times = store.occupied_times(date).await?;
    times.sort();
    times.dedup();
    Ok(times)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, NewBooking, VehicleSize};
    use crate::store::memory::MemoryStore;
    use rust_decimal::Decimal;

    async fn book(store: &MemoryStore, date: &str, time: &str) -> i32 {
        store
            .insert_booking(&NewBooking {
                client_id: 1,
                service_id: 1,
                vehicle_size: VehicleSize::Small,
                booking_date: date.parse().unwrap(),
                booking_time: time.parse().unwrap(),
                address: "Av. Paulista 1000".into(),
                latitude: None,
                longitude: None,
                final_price: Decimal::new(30, 0),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn cancelled_bookings_free_their_slot() {
        let store = MemoryStore::new();
        book(&store, "2025-06-01", "14:00:00").await;
        book(&store, "2025-06-01", "09:00:00").await;
        book(&store, "2025-06-01", "09:00:00").await;
        let cancelled = book(&store, "2025-06-01", "11:00:00").await;
        book(&store, "2025-06-02", "10:00:00").await;
        store.force_status(cancelled, BookingStatus::Cancelled).await;

        let taken = occupied_slots(&store, "2025-06-01".parse().unwrap()).await.unwrap();
        let rendered: Vec<String> = taken.iter().map(|t| t.format("%H:%M").to_string()).collect();
        assert_eq!(rendered, vec!["09:00", "14:00"]);
    }

    #[tokio::test]
    async fn empty_days_have_no_occupied_slots() {
        let store = MemoryStore::new();
        let taken = occupied_slots(&store, "2030-01-01".parse().unwrap()).await.unwrap();
        assert!(taken.is_empty());
    }
}
