//! In-process `Store` used by the unit tests. Each method holds the table lock
//! for its whole body, which gives the same single-row atomicity the
//! conditional updates get from Postgres.

use async_trait::async_trait;
use std::fmt;

use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::error::{DatabaseError, ErrorKind};
use sqlx::types::Json;
use tokio::sync::Mutex;

use super::{Store, StoreResult};
use crate::models::{
    Booking, BookingStatus, BookingView, CompletedRevenue, NewBooking, NewService, NewUser,
    Notification, ProfileUpdate, Role, Service, ServiceChanges, ServiceDetails, ServiceListing,
    ServicePrice, User, UserSummary, VehicleSize,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    services: Vec<Service>,
    prices: Vec<ServicePrice>,
    bookings: Vec<Booking>,
    notifications: Vec<Notification>,
    fail_notifications: bool,
    fail_price_writes: bool,
    stale_checks: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub async fn add_user(&self, name: &str, role: Role) -> i32 {
        let mut t = self.tables.lock().await;
        let id = t.next_user_id();
        t.users.push(User {
            id,
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: Some(format!("555-{:04}", id)),
            password_hash: String::new(),
            role,
            created_at: Utc::now(),
        });
        id
    }

    /// Adds an active service priced for the given sizes only.
    pub async fn add_service(&self, name: &str, prices: &[(VehicleSize, Decimal)]) -> i32 {
        let mut t = self.tables.lock().await;
        let id = t.services.len() as i32 + 1;
        t.services.push(Service {
            id,
            name: name.to_string(),
            description: None,
            duration_minutes: 60,
            details_json: Json(ServiceDetails::default()),
            is_active: true,
        });
        for (size, price) in prices {
            t.prices.push(ServicePrice {
                service_id: id,
                vehicle_size: *size,
                price: *price,
            });
        }
        id
    }

    pub async fn set_price(&self, service_id: i32, size: VehicleSize, price: Decimal) {
        let mut guard = self.tables.lock().await;
        let t = &mut *guard;
        match t
            .prices
            .iter_mut()
            .find(|p| p.service_id == service_id && p.vehicle_size == size)
        {
            Some(row) => row.price = price,
            None => t.prices.push(ServicePrice {
                service_id,
                vehicle_size: size,
                price,
            }),
        }
    }

    pub async fn notifications_for(&self, user_id: i32) -> Vec<Notification> {
        let t = self.tables.lock().await;
        t.notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn booking_count(&self) -> usize {
        self.tables.lock().await.bookings.len()
    }

    pub async fn price_rows(&self, service_id: i32) -> Vec<ServicePrice> {
        let t = self.tables.lock().await;
        t.prices
            .iter()
            .filter(|p| p.service_id == service_id)
            .cloned()
            .collect()
    }

    pub async fn fail_notifications(&self) {
        self.tables.lock().await.fail_notifications = true;
    }

    /// Makes every later service transaction fail before it writes.
    pub async fn fail_price_writes(&self) {
        self.tables.lock().await.fail_price_writes = true;
    }

    /// Makes `email_taken` and `user_has_bookings` answer `false`, as if
    /// another request wrote between the check and the write.
    pub async fn stale_checks(&self) {
        self.tables.lock().await.stale_checks = true;
    }

    /// Forces a booking into a status, bypassing the lifecycle rules.
    pub async fn force_status(&self, id: i32, status: BookingStatus) {
        let mut t = self.tables.lock().await;
        if let Some(b) = t.bookings.iter_mut().find(|b| b.id == id) {
            b.status = status;
        }
    }
}

impl Tables {
    fn next_user_id(&self) -> i32 {
        self.users.iter().map(|u| u.id).max().unwrap_or(0) + 1
    }

    fn view(&self, booking: &Booking, with_client: bool) -> BookingView {
        let service_name = self
            .services
            .iter()
            .find(|s| s.id == booking.service_id)
            .map(|s| s.name.clone());
        let client = self
            .users
            .iter()
            .find(|u| u.id == booking.client_id)
            .filter(|_| with_client);
        BookingView {
            booking: booking.clone(),
            service_name,
            client_name: client.map(|u| u.name.clone()),
            client_phone: client.and_then(|u| u.phone.clone()),
        }
    }
}

fn storage_error(msg: &str) -> sqlx::Error {
    sqlx::Error::Protocol(msg.to_string())
}

/// Same kind of error Postgres reports for a violated constraint.
#[derive(Debug)]
struct ConstraintViolation {
    kind: ErrorKind,
    message: &'static str,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

impl std::error::Error for ConstraintViolation {}

impl DatabaseError for ConstraintViolation {
    fn message(&self) -> &str {
        self.message
    }

    fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self
    }

    fn kind(&self) -> ErrorKind {
        match self.kind {
            ErrorKind::UniqueViolation => ErrorKind::UniqueViolation,
            ErrorKind::ForeignKeyViolation => ErrorKind::ForeignKeyViolation,
            _ => ErrorKind::Other,
        }
    }
}

fn constraint_error(kind: ErrorKind, message: &'static str) -> sqlx::Error {
    sqlx::Error::Database(Box::new(ConstraintViolation { kind, message }))
}

#[async_trait]
impl Store for MemoryStore {
    async fn price_for(&self, service_id: i32, size: VehicleSize) -> StoreResult<Option<Decimal>> {
        let t = self.tables.lock().await;
        let active = t.services.iter().any(|s| s.id == service_id && s.is_active);
        Ok(t
            .prices
            .iter()
            .find(|p| active && p.service_id == service_id && p.vehicle_size == size)
            .map(|p| p.price))
    }

    async fn list_active_services(&self) -> StoreResult<Vec<ServiceListing>> {
        let t = self.tables.lock().await;
        Ok(t.services
            .iter()
            .filter(|s| s.is_active)
            .filter_map(|s| {
                let mut prices: Vec<ServicePrice> = t
                    .prices
                    .iter()
                    .filter(|p| p.service_id == s.id)
                    .cloned()
                    .collect();
                if prices.is_empty() {
                    return None;
                }
                prices.sort_by_key(|p| p.vehicle_size);
                Some(ServiceListing {
                    service: s.clone(),
                    prices,
                })
            })
            .collect())
    }

    async fn create_service(&self, new: &NewService) -> StoreResult<Service> {
        let mut t = self.tables.lock().await;
        if t.fail_price_writes {
            return Err(storage_error("price write failed"));
        }
        let service = Service {
            id: t.services.len() as i32 + 1,
            name: new.name.clone(),
            description: new.description.clone(),
            duration_minutes: 60,
            details_json: Json(ServiceDetails::default()),
            is_active: true,
        };
        t.services.push(service.clone());
        for size in VehicleSize::ALL {
            t.prices.push(ServicePrice {
                service_id: service.id,
                vehicle_size: size,
                price: Decimal::ZERO,
            });
        }
        Ok(service)
    }

    async fn update_service(&self, id: i32, changes: &ServiceChanges) -> StoreResult<bool> {
        let mut guard = self.tables.lock().await;
        let t = &mut *guard;
        if !t.services.iter().any(|s| s.id == id) {
            return Ok(false);
        }
        // nothing is written unless every step can succeed
        if t.fail_price_writes && !changes.prices.is_empty() {
            return Err(storage_error("price write failed"));
        }
        if let Some(service) = t.services.iter_mut().find(|s| s.id == id) {
            service.name = changes.name.clone();
            service.description = changes.description.clone();
            service.details_json = Json(changes.details.clone());
        }
        for (size, price) in &changes.prices {
            match t
                .prices
                .iter_mut()
                .find(|p| p.service_id == id && p.vehicle_size == *size)
            {
                Some(row) => row.price = *price,
                None => t.prices.push(ServicePrice {
                    service_id: id,
                    vehicle_size: *size,
                    price: *price,
                }),
            }
        }
        Ok(true)
    }

    async fn archive_service(&self, id: i32) -> StoreResult<bool> {
        let mut t = self.tables.lock().await;
        match t.services.iter_mut().find(|s| s.id == id) {
            Some(service) => {
                service.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_booking(&self, new: &NewBooking) -> StoreResult<Booking> {
        let mut t = self.tables.lock().await;
        let booking = Booking {
            id: t.bookings.len() as i32 + 1,
            client_id: new.client_id,
            detailer_id: None,
            service_id: new.service_id,
            vehicle_size: new.vehicle_size,
            booking_date: new.booking_date,
            booking_time: new.booking_time,
            address: new.address.clone(),
            latitude: new.latitude,
            longitude: new.longitude,
            final_price: new.final_price,
            notes: None,
            photos: Vec::new(),
            status: BookingStatus::Pending,
            created_at: Utc::now(),
        };
        t.bookings.push(booking.clone());
        Ok(booking)
    }

    async fn find_booking(&self, id: i32) -> StoreResult<Option<Booking>> {
        let t = self.tables.lock().await;
        Ok(t.bookings.iter().find(|b| b.id == id).cloned())
    }

    async fn claim_booking(&self, id: i32, detailer_id: i32) -> StoreResult<Option<Booking>> {
        let mut t = self.tables.lock().await;
        let Some(booking) = t
            .bookings
            .iter_mut()
            .find(|b| b.id == id && b.status == BookingStatus::Pending && b.detailer_id.is_none())
        else {
            return Ok(None);
        };
        booking.detailer_id = Some(detailer_id);
        booking.status = BookingStatus::Confirmed;
        Ok(Some(booking.clone()))
    }

    async fn transition_status(
        &self,
        id: i32,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> StoreResult<Option<Booking>> {
        let mut t = self.tables.lock().await;
        let Some(booking) = t
            .bookings
            .iter_mut()
            .find(|b| b.id == id && b.status == expected)
        else {
            return Ok(None);
        };
        booking.status = next;
        Ok(Some(booking.clone()))
    }

    async fn attach_media(
        &self,
        id: i32,
        notes: &str,
        photo_url: Option<&str>,
    ) -> StoreResult<Option<Booking>> {
        let mut t = self.tables.lock().await;
        let Some(booking) = t.bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(None);
        };
        booking.notes = Some(notes.to_string());
        if let Some(url) = photo_url {
            booking.photos.push(url.to_string());
        }
        Ok(Some(booking.clone()))
    }

    async fn list_all_bookings(&self) -> StoreResult<Vec<BookingView>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<BookingView> = t.bookings.iter().map(|b| t.view(b, true)).collect();
        rows.sort_by(|a, b| b.booking.id.cmp(&a.booking.id));
        Ok(rows)
    }

    async fn list_client_bookings(&self, client_id: i32) -> StoreResult<Vec<BookingView>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<BookingView> = t
            .bookings
            .iter()
            .filter(|b| b.client_id == client_id)
            .map(|b| t.view(b, false))
            .collect();
        rows.sort_by(|a, b| {
            (b.booking.booking_date, b.booking.booking_time)
                .cmp(&(a.booking.booking_date, a.booking.booking_time))
        });
        Ok(rows)
    }

    async fn list_detailer_bookings(&self, detailer_id: i32) -> StoreResult<Vec<BookingView>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<BookingView> = t
            .bookings
            .iter()
            .filter(|b| b.detailer_id == Some(detailer_id))
            .map(|b| t.view(b, true))
            .collect();
        rows.sort_by_key(|v| (v.booking.booking_date, v.booking.booking_time));
        Ok(rows)
    }

    async fn list_pending_bookings(&self) -> StoreResult<Vec<BookingView>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<BookingView> = t
            .bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Pending)
            .map(|b| t.view(b, true))
            .collect();
        rows.sort_by_key(|v| (v.booking.booking_date, v.booking.booking_time));
        Ok(rows)
    }

    async fn occupied_times(&self, date: NaiveDate) -> StoreResult<Vec<NaiveTime>> {
        let t = self.tables.lock().await;
        Ok(t.bookings
            .iter()
            .filter(|b| b.booking_date == date && b.status != BookingStatus::Cancelled)
            .map(|b| b.booking_time)
            .collect())
    }

    async fn completed_revenue(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<CompletedRevenue>> {
        let t = self.tables.lock().await;
        Ok(t.bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Completed)
            .filter(|b| b.booking_date >= from && b.booking_date <= to)
            .map(|b| CompletedRevenue {
                booking_date: b.booking_date,
                final_price: Some(b.final_price),
            })
            .collect())
    }

    async fn count_completed(&self) -> StoreResult<i64> {
        let t = self.tables.lock().await;
        Ok(t.bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Completed)
            .count() as i64)
    }

    async fn insert_user(&self, new: &NewUser) -> StoreResult<User> {
        let mut t = self.tables.lock().await;
        if t.users.iter().any(|u| u.email == new.email) {
            return Err(constraint_error(ErrorKind::UniqueViolation, "users_email_key"));
        }
        let user = User {
            id: t.next_user_id(),
            name: new.name.clone(),
            email: new.email.clone(),
            phone: new.phone.clone(),
            password_hash: new.password_hash.clone(),
            role: Role::Client,
            created_at: Utc::now(),
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: i32) -> StoreResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn email_taken(&self, email: &str, except: Option<i32>) -> StoreResult<bool> {
        let t = self.tables.lock().await;
        let taken = t.users.iter().any(|u| u.email == email && Some(u.id) != except);
        Ok(taken && !t.stale_checks)
    }

    async fn update_profile(&self, id: i32, update: &ProfileUpdate) -> StoreResult<Option<User>> {
        let mut t = self.tables.lock().await;
        if t.users.iter().any(|u| u.email == update.email && u.id != id) {
            return Err(constraint_error(ErrorKind::UniqueViolation, "users_email_key"));
        }
        let Some(user) = t.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        user.name = update.name.clone();
        user.email = update.email.clone();
        user.phone = Some(update.phone.clone());
        Ok(Some(user.clone()))
    }

    async fn list_user_summaries(&self) -> StoreResult<Vec<UserSummary>> {
        let t = self.tables.lock().await;
        Ok(t.users
            .iter()
            .rev()
            .map(|u| {
                let own: Vec<&Booking> =
                    t.bookings.iter().filter(|b| b.client_id == u.id).collect();
                UserSummary {
                    id: u.id,
                    name: u.name.clone(),
                    email: u.email.clone(),
                    phone: u.phone.clone(),
                    role: u.role,
                    created_at: u.created_at,
                    total_bookings: own.len() as i64,
                    total_spent: own
                        .iter()
                        .filter(|b| b.status == BookingStatus::Completed)
                        .map(|b| b.final_price)
                        .sum(),
                }
            })
            .collect())
    }

    async fn set_role(&self, id: i32, role: Role) -> StoreResult<bool> {
        let mut t = self.tables.lock().await;
        match t.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.role = role;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn user_has_bookings(&self, id: i32) -> StoreResult<bool> {
        let t = self.tables.lock().await;
        let referenced = t
            .bookings
            .iter()
            .any(|b| b.client_id == id || b.detailer_id == Some(id));
        Ok(referenced && !t.stale_checks)
    }

    async fn delete_user(&self, id: i32) -> StoreResult<bool> {
        let mut t = self.tables.lock().await;
        if t.bookings.iter().any(|b| b.client_id == id || b.detailer_id == Some(id)) {
            return Err(constraint_error(ErrorKind::ForeignKeyViolation, "bookings_client_id_fkey"));
        }
        let before = t.users.len();
        t.users.retain(|u| u.id != id);
        Ok(t.users.len() < before)
    }

    async fn insert_notification(&self, user_id: i32, title: &str, message: &str) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        if t.fail_notifications {
            return Err(storage_error("notifications table unavailable"));
        }
        let id = t.notifications.len() as i32 + 1;
        t.notifications.push(Notification {
            id,
            user_id,
            title: title.to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_notifications(&self, user_id: i32) -> StoreResult<Vec<Notification>> {
        let t = self.tables.lock().await;
        Ok(t.notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }
}
