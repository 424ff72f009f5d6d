//! Booking lifecycle: creation, detailer acceptance, admin status changes,
//! cancellation and the role-scoped listings.
//!
//! Every mutation is a single conditional update in the store; notifications
//! are sent only after it succeeded and can never undo it.

use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::auth::{require_any_role, require_role, Principal};
use crate::error::AppError;
use crate::models::{Booking, BookingStatus, BookingView, NewBooking, Role};
use crate::notifications::{
    Notifier, BOOKING_CANCELLED, BOOKING_CONFIRMED, BOOKING_RECEIVED, DETAILER_FOUND,
    SERVICE_COMPLETED,
};
use crate::pricing::PricingResolver;
use crate::revenue::{self, RevenueStats};
use crate::storage::{extension_for, PhotoStore};
use crate::store::Store;

/// Body of `POST /api/booking`. Any price the caller sends is not part of
/// this type and is dropped during deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub service_id: i32,
    #[serde(alias = "car_size", alias = "size")]
    pub vehicle_size: String,
    pub booking_date: NaiveDate,
    #[serde(deserialize_with = "crate::models::clock_time::deserialize")]
    pub booking_time: NaiveTime,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub struct PhotoUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub struct BookingEngine {
    store: Arc<dyn Store>,
    pricing: PricingResolver,
    notifier: Notifier,
    photos: Arc<dyn PhotoStore>,
}

impl BookingEngine {
    pub fn new(store: Arc<dyn Store>, photos: Arc<dyn PhotoStore>) -> Self {
        BookingEngine {
            pricing: PricingResolver::new(store.clone()),
            notifier: Notifier::new(store.clone()),
            store,
            photos,
        }
    }

    pub async fn create(&self, principal: &Principal, request: BookingRequest) -> Result<Booking, AppError> {
        require_role(principal, Role::Client)?;
        if request.address.trim().is_empty() {
            return Err(AppError::invalid("address is required"));
        }

        let (vehicle_size, final_price) = self
            .pricing
            .resolve(request.service_id, &request.vehicle_size)
            .await?;

        let booking = self
            .store
            .insert_booking(&NewBooking {
                client_id: principal.id,
                service_id: request.service_id,
                vehicle_size,
                booking_date: request.booking_date,
                booking_time: request.booking_time,
                address: request.address.trim().to_string(),
                latitude: request.latitude,
                longitude: request.longitude,
                final_price,
            })
            .await?;
        info!(
            "Booking {} created by client {} at {}",
            booking.id, principal.id, booking.final_price
        );

        self.notifier
            .notify(
                principal.id,
                BOOKING_RECEIVED,
                &format!(
                    "We received your request for {} at {}. Waiting for approval.",
                    booking.booking_date,
                    booking.booking_time.format("%H:%M")
                ),
            )
            .await;
        Ok(booking)
    }

    pub async fn accept_job(&self, principal: &Principal, booking_id: i32) -> Result<Booking, AppError> {
        require_role(principal, Role::Detailer)?;

        let Some(booking) = self.store.claim_booking(booking_id, principal.id).await? else {
            return match self.store.find_booking(booking_id).await? {
                None => Err(booking_not_found(booking_id)),
                Some(_) => Err(AppError::conflict("job no longer available")),
            };
        };
        info!("Booking {} accepted by detailer {}", booking.id, principal.id);

        self.notifier
            .notify(booking.client_id, DETAILER_FOUND, "A pro has accepted your job!")
            .await;
        Ok(booking)
    }

    pub async fn update_status(
        &self,
        principal: &Principal,
        booking_id: i32,
        status: &str,
    ) -> Result<Booking, AppError> {
        require_role(principal, Role::Admin)?;
        let next: BookingStatus = status.parse().map_err(AppError::InvalidStatus)?;

        let current = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| booking_not_found(booking_id))?;

        if !current.status.admin_can_set(next) {
            return Err(AppError::conflict(format!(
                "booking is {} and cannot become {}",
                current.status, next
            )));
        }
        if current.status == next {
            return Ok(current);
        }

        let booking = self
            .store
            .transition_status(booking_id, current.status, next)
            .await?
            .ok_or_else(|| AppError::conflict("booking changed concurrently, retry"))?;
        info!(
            "Booking {} moved {} -> {} by admin {}",
            booking.id, current.status, next, principal.id
        );

        let message = match next {
            BookingStatus::Confirmed => Some((
                BOOKING_CONFIRMED,
                format!("Your service for {} has been approved.", booking.booking_date),
            )),
            BookingStatus::Completed => Some((
                SERVICE_COMPLETED,
                "Your car is fresh and clean! Thank you for choosing FreshCabz.".to_string(),
            )),
            BookingStatus::Pending | BookingStatus::Cancelled => None,
        };
        if let Some((title, body)) = message {
            self.notifier.notify(booking.client_id, title, &body).await;
        }
        Ok(booking)
    }

    pub async fn cancel(&self, principal: &Principal, booking_id: i32) -> Result<Booking, AppError> {
        let current = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| booking_not_found(booking_id))?;

        match principal.role {
            Role::Admin => {}
            Role::Client if current.client_id == principal.id => {}
            _ => return Err(AppError::forbidden("you can only cancel your own bookings")),
        }
        if current.status.is_terminal() {
            return Err(AppError::conflict(format!("booking is already {}", current.status)));
        }

        let booking = self
            .store
            .transition_status(booking_id, current.status, BookingStatus::Cancelled)
            .await?
            .ok_or_else(|| AppError::conflict("booking changed concurrently, retry"))?;
        info!("Booking {} cancelled by {} {}", booking.id, principal.role, principal.id);

        self.notifier
            .notify(booking.client_id, BOOKING_CANCELLED, "Your service has been cancelled.")
            .await;
        Ok(booking)
    }

    pub async fn list_bookings(&self, principal: &Principal) -> Result<Vec<BookingView>, AppError> {
        let rows = match principal.role {
            Role::Admin => self.store.list_all_bookings().await?,
            Role::Client | Role::Detailer => self.store.list_client_bookings(principal.id).await?,
        };
        Ok(rows)
    }

    pub async fn list_history(&self, principal: &Principal) -> Result<Vec<BookingView>, AppError> {
        let rows = match principal.role {
            Role::Client => self.store.list_client_bookings(principal.id).await?,
            Role::Detailer => self.store.list_detailer_bookings(principal.id).await?,
            Role::Admin => return Err(AppError::forbidden("history is kept per client or detailer")),
        };
        Ok(rows)
    }

    pub async fn list_available_jobs(&self, principal: &Principal) -> Result<Vec<BookingView>, AppError> {
        require_any_role(principal, &[Role::Detailer, Role::Admin])?;
        Ok(self.store.list_pending_bookings().await?)
    }

    pub async fn availability(&self, date: NaiveDate) -> Result<Vec<NaiveTime>, AppError> {
        crate::availability::occupied_slots(self.store.as_ref(), date).await
    }

    pub async fn stats(&self, principal: &Principal) -> Result<RevenueStats, AppError> {
        revenue::revenue_stats(self.store.as_ref(), principal, Local::now().date_naive()).await
    }

    /// Stores the optional photo and appends it, with the notes, to the
    /// booking. Only the owning client, the assigned detailer or an admin may.
    pub async fn attach_media(
        &self,
        principal: &Principal,
        booking_id: i32,
        notes: Option<String>,
        photo: Option<PhotoUpload>,
    ) -> Result<Booking, AppError> {
        let booking = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| booking_not_found(booking_id))?;

        let allowed = match principal.role {
            Role::Admin => true,
            Role::Client => booking.client_id == principal.id,
            Role::Detailer => booking.detailer_id == Some(principal.id),
        };
        if !allowed {
            return Err(AppError::forbidden("not your booking"));
        }

        let photo_url = match photo {
            Some(photo) => {
                let name = format!(
                    "booking_{}_{}.{}",
                    booking_id,
                    chrono::Utc::now().timestamp_millis(),
                    extension_for(&photo.content_type)
                );
                Some(self.photos.put(&name, photo.bytes, &photo.content_type).await?)
            }
            None => None,
        };

        let notes = notes.unwrap_or_default();
        self.store
            .attach_media(booking_id, &notes, photo_url.as_deref())
            .await?
            .ok_or_else(|| booking_not_found(booking_id))
    }
}

fn booking_not_found(id: i32) -> AppError {
    AppError::not_found(format!("booking {}", id))
}
