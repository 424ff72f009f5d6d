use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Detailer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Detailer => "detailer",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "detailer" => Ok(Role::Detailer),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Whether an administrator may move a booking from `self` to `next`.
    /// Terminal bookings never move, and nothing returns to pending.
    pub fn admin_can_set(&self, next: BookingStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next != BookingStatus::Pending || *self == BookingStatus::Pending
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status '{}'", other)),
        }
    }
}

impl TryFrom<String> for BookingStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of vehicle categories a price row can exist for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VehicleSize {
    Small,
    Medium,
    Large,
    #[serde(rename = "X-Large")]
    XLarge,
}

impl VehicleSize {
    pub const ALL: [VehicleSize; 4] = [
        VehicleSize::Small,
        VehicleSize::Medium,
        VehicleSize::Large,
        VehicleSize::XLarge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleSize::Small => "Small",
            VehicleSize::Medium => "Medium",
            VehicleSize::Large => "Large",
            VehicleSize::XLarge => "X-Large",
        }
    }
}

impl FromStr for VehicleSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VehicleSize::ALL
            .into_iter()
            .find(|size| size.as_str() == s)
            .ok_or_else(|| format!("unknown vehicle size '{}'", s))
    }
}

impl TryFrom<String> for VehicleSize {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for VehicleSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A user row as the admin listing shows it, with booking totals.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserSummary {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub total_bookings: i64,
    pub total_spent: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDetails {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub exterior: Vec<String>,
    #[serde(default)]
    pub interior: Vec<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Service {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub details_json: Json<ServiceDetails>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ServicePrice {
    #[serde(skip_serializing)]
    pub service_id: i32,
    #[serde(rename = "size")]
    #[sqlx(try_from = "String")]
    pub vehicle_size: VehicleSize,
    pub price: Decimal,
}

/// An active catalog entry with its prices ordered Small → X-Large.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceListing {
    #[serde(flatten)]
    pub service: Service,
    pub prices: Vec<ServicePrice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewService {
    pub name: String,
    pub description: Option<String>,
}

/// Validated form of a service edit: details plus per-size prices.
#[derive(Debug, Clone)]
pub struct ServiceChanges {
    pub name: String,
    pub description: Option<String>,
    pub details: ServiceDetails,
    pub prices: Vec<(VehicleSize, Decimal)>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Booking {
    pub id: i32,
    pub client_id: i32,
    pub detailer_id: Option<i32>,
    pub service_id: i32,
    #[sqlx(try_from = "String")]
    pub vehicle_size: VehicleSize,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub final_price: Decimal,
    pub notes: Option<String>,
    pub photos: Vec<String>,
    #[sqlx(try_from = "String")]
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

/// Booking row joined with the human-readable names listings show.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BookingView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub booking: Booking,
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub client_id: i32,
    pub service_id: i32,
    pub vehicle_size: VehicleSize,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub final_price: Decimal,
}

#[derive(Debug, Clone, FromRow)]
pub struct CompletedRevenue {
    pub booking_date: NaiveDate,
    pub final_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Accepts `10:00` as well as `10:00:00`.
pub mod clock_time {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer};

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
            .ok()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid time '{}'", raw)))
    }
}
