//! Relational store seam. The engine and the other components only ever see
//! `dyn Store`; the Postgres implementation is the production one.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;

use crate::models::{
    Booking, BookingStatus, BookingView, CompletedRevenue, NewBooking, NewService, NewUser,
    Notification, ProfileUpdate, Role, Service, ServiceChanges, ServiceListing, User,
    UserSummary, VehicleSize,
};

pub mod postgres;

#[cfg(test)]
pub mod memory;

pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, sqlx::Error>;

#[async_trait]
pub trait Store: Send + Sync {
    // catalog

    /// Price of an active service for one vehicle size, if configured.
    async fn price_for(&self, service_id: i32, size: VehicleSize) -> StoreResult<Option<Decimal>>;
    async fn list_active_services(&self) -> StoreResult<Vec<ServiceListing>>;
    /// Creates the service and a zero price row for every size, all or nothing.
    async fn create_service(&self, new: &NewService) -> StoreResult<Service>;
    /// Rewrites details and prices in one transaction. `false` when absent.
    async fn update_service(&self, id: i32, changes: &ServiceChanges) -> StoreResult<bool>;
    async fn archive_service(&self, id: i32) -> StoreResult<bool>;

    // bookings

    async fn insert_booking(&self, new: &NewBooking) -> StoreResult<Booking>;
    async fn find_booking(&self, id: i32) -> StoreResult<Option<Booking>>;
    /// Assigns the detailer and confirms, only while the booking is pending.
    async fn claim_booking(&self, id: i32, detailer_id: i32) -> StoreResult<Option<Booking>>;
    /// Moves `id` from `expected` to `next`. `None` when the row was not in
    /// `expected` any more (or does not exist).
    async fn transition_status(
        &self,
        id: i32,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> StoreResult<Option<Booking>>;
    async fn attach_media(
        &self,
        id: i32,
        notes: &str,
        photo_url: Option<&str>,
    ) -> StoreResult<Option<Booking>>;
    async fn list_all_bookings(&self) -> StoreResult<Vec<BookingView>>;
    async fn list_client_bookings(&self, client_id: i32) -> StoreResult<Vec<BookingView>>;
    async fn list_detailer_bookings(&self, detailer_id: i32) -> StoreResult<Vec<BookingView>>;
    async fn list_pending_bookings(&self) -> StoreResult<Vec<BookingView>>;
    async fn occupied_times(&self, date: NaiveDate) -> StoreResult<Vec<NaiveTime>>;
    async fn completed_revenue(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<CompletedRevenue>>;
    async fn count_completed(&self) -> StoreResult<i64>;

    // users

    async fn insert_user(&self, new: &NewUser) -> StoreResult<User>;
    async fn find_user(&self, id: i32) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn email_taken(&self, email: &str, except: Option<i32>) -> StoreResult<bool>;
    async fn update_profile(&self, id: i32, update: &ProfileUpdate) -> StoreResult<Option<User>>;
    async fn list_user_summaries(&self) -> StoreResult<Vec<UserSummary>>;
    async fn set_role(&self, id: i32, role: Role) -> StoreResult<bool>;
    async fn user_has_bookings(&self, id: i32) -> StoreResult<bool>;
    async fn delete_user(&self, id: i32) -> StoreResult<bool>;

    // notifications

    async fn insert_notification(&self, user_id: i32, title: &str, message: &str) -> StoreResult<()>;
    async fn list_notifications(&self, user_id: i32) -> StoreResult<Vec<Notification>>;
}
