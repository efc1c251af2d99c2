use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::{Booking, BookingStatus, Review};
use crate::store::MarketplaceStore;
use crate::AppState;

pub const MAX_COMMENT_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub rating: i16,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewList {
    pub reviews: Vec<Review>,
    pub count: usize,
    pub average_rating: Option<f64>,
}

fn validate(request: &CreateReviewRequest) -> Result<(), AppError> {
    if !(1..=5).contains(&request.rating) {
        return Err(AppError::Validation("Rating must be between 1 and 5".to_string()));
    }
    if request.comment.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::Validation(format!(
            "Comment must be at most {} characters",
            MAX_COMMENT_CHARS
        )));
    }
    Ok(())
}

/// Rounded to one decimal, `None` without reviews.
pub fn average_rating(reviews: &[Review]) -> Option<f64> {
    if reviews.is_empty() {
        return None;
    }
    let sum: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
    let average = sum as f64 / reviews.len() as f64;
    Some((average * 10.0).round() / 10.0)
}

fn is_finished_stay(booking: &Booking, property_id: Uuid, today: NaiveDate) -> bool {
    booking.property_id == property_id
        && matches!(booking.status, BookingStatus::Confirmed | BookingStatus::Completed)
        && booking.check_out <= today
}

/// The earliest finished stay of `guest_id` at the property that has no review yet.
async fn reviewable_booking(
    store: &dyn MarketplaceStore,
    guest_id: Uuid,
    property_id: Uuid,
    today: NaiveDate,
) -> Result<Booking, AppError> {
    let mut stays: Vec<Booking> = store
        .list_guest_bookings(guest_id)
        .await?
        .into_iter()
        .filter(|b| is_finished_stay(b, property_id, today))
        .collect();
    if stays.is_empty() {
        return Err(AppError::Forbidden(
            "You can only review properties you have stayed at".to_string(),
        ));
    }
    stays.sort_by_key(|b| b.check_out);

    for stay in stays {
        if store.find_review_by_booking(stay.id).await?.is_none() {
            return Ok(stay);
        }
    }
    Err(AppError::Conflict("You have already reviewed this stay".to_string()))
}

pub async fn create_review(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(property_id): Path<Uuid>,
    Json(request): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), AppError> {
    validate(&request)?;
    state
        .store
        .get_property(property_id)
        .await?
        .ok_or(AppError::NotFound("Property"))?;

    let now = Utc::now();
    let booking = reviewable_booking(state.store.as_ref(), user.id, property_id, now.date_naive()).await?;
    let review = state
        .store
        .insert_review(Review {
            id: Uuid::new_v4(),
            property_id,
            booking_id: booking.id,
            author_id: user.id,
            rating: request.rating,
            comment: request.comment.trim().to_string(),
            created_at: now,
        })
        .await?;

    log::info!("User {} reviewed property {} ({} stars)", user.id, property_id, review.rating);
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
) -> Result<Json<ReviewList>, AppError> {
    let reviews = state.store.list_reviews(property_id).await?;
    Ok(Json(ReviewList {
        count: reviews.len(),
        average_rating: average_rating(&reviews),
        reviews,
    }))
}
