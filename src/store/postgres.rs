use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use sqlx::{types::Json, PgPool};

use super::{Store, StoreResult};
use crate::models::{
    Booking, BookingStatus, BookingView, CompletedRevenue, NewBooking, NewService, NewUser,
    Notification, ProfileUpdate, Role, Service, ServiceChanges, ServiceListing, ServicePrice,
    User, UserSummary, VehicleSize,
};

const SIZE_ORDER: &str = "CASE sp.vehicle_size
        WHEN 'Small' THEN 1
        WHEN 'Medium' THEN 2
        WHEN 'Large' THEN 3
        ELSE 4
    END";

const USER_COLUMNS: &str = "id, name, email, phone, password_hash, role, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn price_for(&self, service_id: i32, size: VehicleSize) -> StoreResult<Option<Decimal>> {
        sqlx::query_scalar::<_, Decimal>(
            "SELECT sp.price FROM service_prices sp
             JOIN services s ON s.id = sp.service_id
             WHERE sp.service_id = $1 AND sp.vehicle_size = $2 AND s.is_active = true",
        )
        .bind(service_id)
        .bind(size.as_str())
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_active_services(&self) -> StoreResult<Vec<ServiceListing>> {
        let services = sqlx::query_as::<_, Service>(
            "SELECT id, name, description, duration_minutes, details_json, is_active
             FROM services WHERE is_active = true ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let prices = sqlx::query_as::<_, ServicePrice>(&format!(
            "SELECT sp.service_id, sp.vehicle_size, sp.price
             FROM service_prices sp
             JOIN services s ON s.id = sp.service_id
             WHERE s.is_active = true
             ORDER BY sp.service_id, {}",
            SIZE_ORDER
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut by_service: HashMap<i32, Vec<ServicePrice>> = HashMap::new();
        for price in prices {
            by_service.entry(price.service_id).or_default().push(price);
        }

        // services without any price row are not bookable, so not listed
        Ok(services
            .into_iter()
            .filter_map(|service| {
                by_service
                    .remove(&service.id)
                    .map(|prices| ServiceListing { service, prices })
            })
            .collect())
    }

    async fn create_service(&self, new: &NewService) -> StoreResult<Service> {
        let mut tx = self.pool.begin().await?;

        let service = sqlx::query_as::<_, Service>(
            "INSERT INTO services (name, description, duration_minutes, is_active, details_json)
             VALUES ($1, $2, 60, true, $3)
             RETURNING id, name, description, duration_minutes, details_json, is_active",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(Json(crate::models::ServiceDetails::default()))
        .fetch_one(&mut *tx)
        .await?;

        for size in VehicleSize::ALL {
            sqlx::query(
                "INSERT INTO service_prices (service_id, vehicle_size, price) VALUES ($1, $2, 0)",
            )
            .bind(service.id)
            .bind(size.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(service)
    }

    async fn update_service(&self, id: i32, changes: &ServiceChanges) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE services SET name = $1, description = $2, details_json = $3 WHERE id = $4",
        )
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(Json(&changes.details))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for (size, price) in &changes.prices {
            sqlx::query(
                "INSERT INTO service_prices (service_id, vehicle_size, price) VALUES ($1, $2, $3)
                 ON CONFLICT (service_id, vehicle_size) DO UPDATE SET price = EXCLUDED.price",
            )
            .bind(id)
            .bind(size.as_str())
            .bind(price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn archive_service(&self, id: i32) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE services SET is_active = false WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_booking(&self, new: &NewBooking) -> StoreResult<Booking> {
        sqlx::query_as::<_, Booking>(
            "INSERT INTO bookings
             (client_id, service_id, vehicle_size, booking_date, booking_time, address,
              latitude, longitude, final_price, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending')
             RETURNING *",
        )
        .bind(new.client_id)
        .bind(new.service_id)
        .bind(new.vehicle_size.as_str())
        .bind(new.booking_date)
        .bind(new.booking_time)
        .bind(&new.address)
        .bind(new.latitude)
        .bind(new.longitude)
        .bind(new.final_price)
        .fetch_one(&self.pool)
        .await
    }

    async fn find_booking(&self, id: i32) -> StoreResult<Option<Booking>> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn claim_booking(&self, id: i32, detailer_id: i32) -> StoreResult<Option<Booking>> {
        sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET detailer_id = $1, status = 'confirmed'
             WHERE id = $2 AND status = 'pending' AND detailer_id IS NULL
             RETURNING *",
        )
        .bind(detailer_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn transition_status(
        &self,
        id: i32,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> StoreResult<Option<Booking>> {
        sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET status = $1 WHERE id = $2 AND status = $3 RETURNING *",
        )
        .bind(next.as_str())
        .bind(id)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
    }

    async fn attach_media(
        &self,
        id: i32,
        notes: &str,
        photo_url: Option<&str>,
    ) -> StoreResult<Option<Booking>> {
        sqlx::query_as::<_, Booking>(
            "UPDATE bookings
             SET notes = $1,
                 photos = CASE WHEN $2::text IS NULL THEN photos ELSE array_append(photos, $2::text) END
             WHERE id = $3
             RETURNING *",
        )
        .bind(notes)
        .bind(photo_url)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_all_bookings(&self) -> StoreResult<Vec<BookingView>> {
        sqlx::query_as::<_, BookingView>(
            "SELECT b.*, s.name AS service_name, u.name AS client_name, u.phone AS client_phone
             FROM bookings b
             LEFT JOIN services s ON b.service_id = s.id
             LEFT JOIN users u ON b.client_id = u.id
             ORDER BY b.id DESC",
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn list_client_bookings(&self, client_id: i32) -> StoreResult<Vec<BookingView>> {
        sqlx::query_as::<_, BookingView>(
            "SELECT b.*, s.name AS service_name,
                    NULL::text AS client_name, NULL::text AS client_phone
             FROM bookings b
             LEFT JOIN services s ON b.service_id = s.id
             WHERE b.client_id = $1
             ORDER BY b.booking_date DESC, b.booking_time DESC",
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn list_detailer_bookings(&self, detailer_id: i32) -> StoreResult<Vec<BookingView>> {
        sqlx::query_as::<_, BookingView>(
            "SELECT b.*, s.name AS service_name, u.name AS client_name, u.phone AS client_phone
             FROM bookings b
             LEFT JOIN services s ON b.service_id = s.id
             LEFT JOIN users u ON b.client_id = u.id
             WHERE b.detailer_id = $1
             ORDER BY b.booking_date ASC, b.booking_time ASC",
        )
        .bind(detailer_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn list_pending_bookings(&self) -> StoreResult<Vec<BookingView>> {
        sqlx::query_as::<_, BookingView>(
            "SELECT b.*, s.name AS service_name, u.name AS client_name, u.phone AS client_phone
             FROM bookings b
             LEFT JOIN services s ON b.service_id = s.id
             LEFT JOIN users u ON b.client_id = u.id
             WHERE b.status = 'pending'
             ORDER BY b.booking_date ASC, b.booking_time ASC",
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn occupied_times(&self, date: NaiveDate) -> StoreResult<Vec<NaiveTime>> {
        sqlx::query_scalar::<_, NaiveTime>(
            "SELECT DISTINCT booking_time FROM bookings
             WHERE booking_date = $1 AND status != 'cancelled'
             ORDER BY booking_time",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
    }

    async fn completed_revenue(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<CompletedRevenue>> {
        sqlx::query_as::<_, CompletedRevenue>(
            "SELECT booking_date, final_price FROM bookings
             WHERE status = 'completed' AND booking_date BETWEEN $1 AND $2",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
    }

    async fn count_completed(&self) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bookings WHERE status = 'completed'")
            .fetch_one(&self.pool)
            .await
    }

    async fn insert_user(&self, new: &NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, phone, password_hash, role)
             VALUES ($1, $2, $3, $4, 'client')
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(&new.password_hash)
        .fetch_one(&self.pool)
        .await
    }

    async fn find_user(&self, id: i32) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    async fn email_taken(&self, email: &str, except: Option<i32>) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 AND ($2::int IS NULL OR id != $2))",
        )
        .bind(email)
        .bind(except)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_profile(&self, id: i32, update: &ProfileUpdate) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET name = $1, phone = $2, email = $3 WHERE id = $4 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&update.name)
        .bind(&update.phone)
        .bind(&update.email)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_user_summaries(&self) -> StoreResult<Vec<UserSummary>> {
        sqlx::query_as::<_, UserSummary>(
            "SELECT u.id, u.name, u.email, u.phone, u.role, u.created_at,
                    COUNT(b.id) AS total_bookings,
                    COALESCE(SUM(b.final_price) FILTER (WHERE b.status = 'completed'), 0) AS total_spent
             FROM users u
             LEFT JOIN bookings b ON u.id = b.client_id
             GROUP BY u.id
             ORDER BY u.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn set_role(&self, id: i32, role: Role) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn user_has_bookings(&self, id: i32) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM bookings WHERE client_id = $1 OR detailer_id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
    }

    async fn delete_user(&self, id: i32) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_notification(&self, user_id: i32, title: &str, message: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO notifications (user_id, title, message, created_at)
             VALUES ($1, $2, $3, NOW())",
        )
        .bind(user_id)
        .bind(title)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_notifications(&self, user_id: i32) -> StoreResult<Vec<Notification>> {
        sqlx::query_as::<_, Notification>(
            "SELECT id, user_id, title, message, created_at FROM notifications
             WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}
