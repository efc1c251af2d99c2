use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::{Category, PriceType, Property};
use crate::pricing::{night_count, BookingQuote, FeeSchedule, PriceBreakdown};
use crate::store::PropertyFilter;
use crate::AppState;

/// Column widths of `properties.title` and `properties.city`.
const MAX_TITLE_CHARS: usize = 120;
const MAX_CITY_CHARS: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct PropertyQuery {
    pub category: Option<Category>,
    pub city: Option<String>,
}

/// Fetches all active properties, optionally narrowed by category and city.
pub async fn list_properties(
    State(state): State<AppState>,
    Query(query): Query<PropertyQuery>,
) -> Result<Json<Vec<Property>>, AppError> {
    let filter = PropertyFilter {
        category: query.category,
        city: query.city.filter(|c| !c.trim().is_empty()),
    };
    let properties = state.store.list_properties(filter).await?;
    log::info!("Successfully fetched {} properties", properties.len());
    Ok(Json(properties))
}

/// Fetches a specific active property by its ID
pub async fn get_property(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
) -> Result<Json<Property>, AppError> {
    let property = state
        .store
        .get_property(property_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or(AppError::NotFound("Property"))?;
    Ok(Json(property))
}

fn default_max_guests() -> i16 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePropertyRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub price: f64,
    pub price_type: String,
    #[serde(default)]
    pub cleaning_fee: f64,
    pub city: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub bedrooms: i16,
    #[serde(default)]
    pub bathrooms: i16,
    #[serde(default = "default_max_guests")]
    pub max_guests: i16,
}

impl CreatePropertyRequest {
    fn into_property(self, host_id: Uuid, now: chrono::DateTime<Utc>) -> Result<Property, AppError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::Validation("Title is required".to_string()));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(AppError::Validation(format!(
                "Title must be at most {} characters",
                MAX_TITLE_CHARS
            )));
        }
        let city = self.city.trim().to_string();
        if city.is_empty() || city.chars().count() > MAX_CITY_CHARS {
            return Err(AppError::Validation(format!(
                "City must be between 1 and {} characters",
                MAX_CITY_CHARS
            )));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(AppError::Validation("Price must be zero or more".to_string()));
        }
        if !self.cleaning_fee.is_finite() || self.cleaning_fee < 0.0 {
            return Err(AppError::Validation("Cleaning fee must be zero or more".to_string()));
        }
        if self.max_guests < 1 {
            return Err(AppError::Validation("A listing must allow at least one guest".to_string()));
        }
        let category = self.category.parse::<Category>().map_err(AppError::Validation)?;
        let price_type = self.price_type.parse::<PriceType>().map_err(AppError::Validation)?;

        Ok(Property {
            id: Uuid::new_v4(),
            host_id,
            title,
            description: self.description,
            category,
            price: self.price,
            price_type,
            cleaning_fee: self.cleaning_fee,
            city,
            address: self.address,
            bedrooms: self.bedrooms.max(0),
            bathrooms: self.bathrooms.max(0),
            max_guests: self.max_guests,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

pub async fn create_property(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreatePropertyRequest>,
) -> Result<(StatusCode, Json<Property>), AppError> {
    if !user.can_host() {
        return Err(AppError::Forbidden("Only hosts can list properties".to_string()));
    }
    let property = request.into_property(user.id, Utc::now())?;
    let property = state.store.insert_property(property).await?;
    log::info!("Host {} listed property {}", user.id, property.id);
    Ok((StatusCode::CREATED, Json(property)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQuery {
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
}

/// Price breakdown for the selected dates. Missing or reversed dates quote
/// zero nights rather than failing.
pub async fn quote(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<PriceBreakdown>, AppError> {
    let property = state
        .store
        .get_property(property_id)
        .await?
        .ok_or(AppError::NotFound("Property"))?;
    let settings = state.store.get_settings().await?;

    let nights = night_count(query.check_in, query.check_out);
    let quote = BookingQuote::for_property(&property, nights);
    Ok(Json(PriceBreakdown::from_quote(quote, &FeeSchedule::new(&property, &settings))))
}
