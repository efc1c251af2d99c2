use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::booking::{
    CancelBookingRequest, CreatePaymentRequest, CreatePaymentResponse, ProcessRefundRequest, RefundResponse,
    VerifyPaymentRequest, VerifyPaymentResponse,
};
use crate::error::AppError;
use crate::models::Booking;
use crate::refund::RefundQuote;
use crate::AppState;

pub async fn create_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>, AppError> {
    let response = state.bookings.create_payment(user, request, Utc::now()).await?;
    Ok(Json(response))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    if request.session_id.trim().is_empty() {
        return Err(AppError::Validation("sessionId is required".to_string()));
    }
    let response = state
        .bookings
        .verify_payment(user, &request.session_id, Utc::now())
        .await?;
    Ok(Json(response))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<RefundResponse>, AppError> {
    let response = state.bookings.cancel_booking(user, request, Utc::now()).await?;
    Ok(Json(response))
}

pub async fn process_refund(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ProcessRefundRequest>,
) -> Result<Json<RefundResponse>, AppError> {
    let response = state.bookings.process_refund(user, request, Utc::now()).await?;
    Ok(Json(response))
}

pub async fn refund_preview(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<RefundQuote>, AppError> {
    let quote = state.bookings.refund_preview(user, booking_id, Utc::now()).await?;
    Ok(Json(quote))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingView {
    #[default]
    Guest,
    Host,
}

#[derive(Debug, Deserialize)]
pub struct BookingListQuery {
    #[serde(rename = "as", default)]
    pub view: BookingView,
}

/// Bookings the caller made, or with `?as=host` bookings on the caller's listings.
pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<BookingListQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let bookings = match query.view {
        BookingView::Guest => state.store.list_guest_bookings(user.id).await?,
        BookingView::Host => {
            if !user.can_host() {
                return Err(AppError::Forbidden("Only hosts can list host bookings".to_string()));
            }
            state.store.list_host_bookings(user.id).await?
        }
    };
    log::info!("Fetched {} bookings for {} as {:?}", bookings.len(), user.id, query.view);
    Ok(Json(bookings))
}
