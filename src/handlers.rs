//! HTTP surface. Handlers only extract, delegate and shape the response; all
//! rules live in the services behind `AppState`.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts, Multipart, Path, Query, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::accounts::{Accounts, LoginRequest, SignupRequest};
use crate::auth::{Principal, TokenKeys};
use crate::booking::{BookingEngine, BookingRequest, PhotoUpload};
use crate::catalog::{Catalog, ServiceUpdate};
use crate::error::AppError;
use crate::models::{Booking, BookingView, NewService, Notification, ProfileUpdate, ServiceListing, User, UserSummary};
use crate::revenue::RevenueStats;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
    pub catalog: Arc<Catalog>,
    pub accounts: Arc<Accounts>,
    pub keys: Arc<TokenKeys>,
}

type ApiResult<T> = Result<T, AppError>;

// Extractors whose rejections answer with the usual `{code, msg}` body.

#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
struct AppJson<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
struct AppQuery<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(AppError))]
struct AppPath<T>(T);

#[derive(Serialize)]
struct BookingReply {
    msg: String,
    booking: Booking,
}

impl BookingReply {
    fn new(msg: impl Into<String>, booking: Booking) -> Json<Self> {
        Json(BookingReply { msg: msg.into(), booking })
    }
}

fn message(msg: impl Into<String>) -> Json<serde_json::Value> {
    Json(json!({ "msg": msg.into() }))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(liveness))
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/user/me", get(me))
        .route("/api/user/update", put(update_me))
        .route("/api/user/notifications", get(my_notifications))
        .route("/api/users", get(list_users))
        .route("/api/users/role/:id", put(change_role))
        .route("/api/users/:id", delete(delete_user))
        .route("/api/services", get(list_services).post(create_service))
        .route("/api/services/:id", put(update_service).delete(archive_service))
        .route("/api/booking", get(list_bookings).post(create_booking))
        .route("/api/booking/history", get(booking_history))
        .route("/api/booking/available", get(available_jobs))
        .route("/api/booking/availability", get(availability))
        .route("/api/booking/stats", get(stats))
        .route("/api/booking/accept/:id", put(accept_job))
        .route("/api/booking/cancel/:id", put(cancel_booking))
        .route("/api/booking/:id", put(update_status))
        .route(
            "/api/upload/:booking_id",
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .layer(cors)
        .with_state(state)
}

async fn liveness() -> &'static str {
    "FreshCabz API is running"
}

// auth

async fn signup(
    State(state): State<AppState>,
    AppJson(body): AppJson<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = state.accounts.signup(body).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn login(
    State(state): State<AppState>,
    AppJson(body): AppJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.accounts.login(body).await?))
}

// own profile

async fn me(State(state): State<AppState>, principal: Principal) -> ApiResult<Json<User>> {
    Ok(Json(state.accounts.profile(&principal).await?))
}

async fn update_me(
    State(state): State<AppState>,
    principal: Principal,
    AppJson(body): AppJson<ProfileUpdate>,
) -> ApiResult<impl IntoResponse> {
    let user = state.accounts.update_profile(&principal, body).await?;
    Ok(Json(json!({ "msg": "Profile updated!", "user": user })))
}

async fn my_notifications(State(state): State<AppState>, principal: Principal) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(state.accounts.notifications(&principal).await?))
}

// admin users

#[derive(Deserialize)]
struct RoleBody {
    #[serde(alias = "newRole")]
    role: String,
}

async fn list_users(State(state): State<AppState>, principal: Principal) -> ApiResult<Json<Vec<UserSummary>>> {
    Ok(Json(state.accounts.list_users(&principal).await?))
}

async fn change_role(
    State(state): State<AppState>,
    principal: Principal,
    AppPath(id): AppPath<i32>,
    AppJson(body): AppJson<RoleBody>,
) -> ApiResult<impl IntoResponse> {
    let role = state.accounts.change_role(&principal, id, &body.role).await?;
    Ok(message(format!("User role updated to {}", role)))
}

async fn delete_user(
    State(state): State<AppState>,
    principal: Principal,
    AppPath(id): AppPath<i32>,
) -> ApiResult<impl IntoResponse> {
    state.accounts.delete_user(&principal, id).await?;
    Ok(message("User deleted successfully"))
}

// catalog

async fn list_services(State(state): State<AppState>) -> ApiResult<Json<Vec<ServiceListing>>> {
    Ok(Json(state.catalog.list().await?))
}

async fn create_service(
    State(state): State<AppState>,
    principal: Principal,
    AppJson(body): AppJson<NewService>,
) -> ApiResult<impl IntoResponse> {
    let service = state.catalog.create(&principal, body).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "msg": "Service created!", "id": service.id })),
    ))
}

async fn update_service(
    State(state): State<AppState>,
    principal: Principal,
    AppPath(id): AppPath<i32>,
    AppJson(body): AppJson<ServiceUpdate>,
) -> ApiResult<impl IntoResponse> {
    state.catalog.update(&principal, id, body).await?;
    Ok(message("Service updated successfully!"))
}

async fn archive_service(
    State(state): State<AppState>,
    principal: Principal,
    AppPath(id): AppPath<i32>,
) -> ApiResult<impl IntoResponse> {
    state.catalog.archive(&principal, id).await?;
    Ok(message("Service removed"))
}

// bookings

#[derive(Deserialize)]
struct StatusBody {
    status: String,
}

#[derive(Deserialize)]
struct AvailabilityParams {
    date: NaiveDate,
}

async fn list_bookings(State(state): State<AppState>, principal: Principal) -> ApiResult<Json<Vec<BookingView>>> {
    Ok(Json(state.engine.list_bookings(&principal).await?))
}

async fn create_booking(
    State(state): State<AppState>,
    principal: Principal,
    AppJson(body): AppJson<BookingRequest>,
) -> ApiResult<impl IntoResponse> {
    let booking = state.engine.create(&principal, body).await?;
    Ok((StatusCode::CREATED, BookingReply::new("Booking created successfully!", booking)))
}

async fn update_status(
    State(state): State<AppState>,
    principal: Principal,
    AppPath(id): AppPath<i32>,
    AppJson(body): AppJson<StatusBody>,
) -> ApiResult<impl IntoResponse> {
    let booking = state.engine.update_status(&principal, id, &body.status).await?;
    let msg = format!("Status updated to {}", booking.status);
    Ok(BookingReply::new(msg, booking))
}

async fn accept_job(
    State(state): State<AppState>,
    principal: Principal,
    AppPath(id): AppPath<i32>,
) -> ApiResult<impl IntoResponse> {
    let booking = state.engine.accept_job(&principal, id).await?;
    Ok(BookingReply::new("Job accepted!", booking))
}

async fn cancel_booking(
    State(state): State<AppState>,
    principal: Principal,
    AppPath(id): AppPath<i32>,
) -> ApiResult<impl IntoResponse> {
    let booking = state.engine.cancel(&principal, id).await?;
    Ok(BookingReply::new("Cancelled successfully", booking))
}

async fn booking_history(State(state): State<AppState>, principal: Principal) -> ApiResult<Json<Vec<BookingView>>> {
    Ok(Json(state.engine.list_history(&principal).await?))
}

async fn available_jobs(State(state): State<AppState>, principal: Principal) -> ApiResult<Json<Vec<BookingView>>> {
    Ok(Json(state.engine.list_available_jobs(&principal).await?))
}

async fn availability(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<AvailabilityParams>,
) -> ApiResult<Json<Vec<NaiveTime>>> {
    Ok(Json(state.engine.availability(params.date).await?))
}

async fn stats(State(state): State<AppState>, principal: Principal) -> ApiResult<Json<RevenueStats>> {
    Ok(Json(state.engine.stats(&principal).await?))
}

// media

async fn upload(
    State(state): State<AppState>,
    principal: Principal,
    AppPath(booking_id): AppPath<i32>,
    mut multipart: Multipart,
) -> ApiResult<Json<Booking>> {
    let bad_form = |e: axum::extract::multipart::MultipartError| AppError::invalid(e.body_text());

    let mut notes = None;
    let mut photo = None;
    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("photo") => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(bad_form)?;
                if !bytes.is_empty() {
                    photo = Some(PhotoUpload { bytes: bytes.to_vec(), content_type });
                }
            }
            Some("notes") => notes = Some(field.text().await.map_err(bad_form)?),
            other => debug!("ignoring upload field {:?}", other),
        }
    }

    let booking = state
        .engine
        .attach_media(&principal, booking_id, notes, photo)
        .await?;
    Ok(Json(booking))
}
