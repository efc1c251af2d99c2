use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::booking::ReleasePayoutResponse;
use crate::error::AppError;
use crate::models::{CommissionTransaction, PlatformSettings};
use crate::pricing::MAX_COMMISSION_BPS;
use crate::AppState;

fn require_admin(user: AuthUser) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin access required".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub commission_bps: i32,
    pub service_fee_rate: f64,
    pub tax_rate: f64,
}

impl UpdateSettingsRequest {
    fn validate(&self) -> Result<(), AppError> {
        if !(0..=MAX_COMMISSION_BPS).contains(&self.commission_bps) {
            return Err(AppError::Validation(format!(
                "commissionBps must be between 0 and {}",
                MAX_COMMISSION_BPS
            )));
        }
        for (name, rate) in [("serviceFeeRate", self.service_fee_rate), ("taxRate", self.tax_rate)] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(AppError::Validation(format!("{} must be between 0 and 1", name)));
            }
        }
        Ok(())
    }
}

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<PlatformSettings>, AppError> {
    require_admin(user)?;
    Ok(Json(state.store.get_settings().await?))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<PlatformSettings>, AppError> {
    require_admin(user)?;
    request.validate()?;

    let settings = state
        .store
        .save_settings(PlatformSettings {
            id: PlatformSettings::SINGLETON_ID,
            commission_bps: request.commission_bps,
            service_fee_rate: request.service_fee_rate,
            tax_rate: request.tax_rate,
            updated_at: Utc::now(),
        })
        .await?;
    log::info!(
        "Admin {} set commission to {} bps, service fee {}, tax {}",
        user.id,
        settings.commission_bps,
        settings.service_fee_rate,
        settings.tax_rate
    );
    Ok(Json(settings))
}

pub async fn list_commissions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<CommissionTransaction>>, AppError> {
    require_admin(user)?;
    Ok(Json(state.store.list_commissions().await?))
}

pub async fn release_payout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ReleasePayoutResponse>, AppError> {
    let response = state.bookings.release_payout(user, payment_id, Utc::now()).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(commission_bps: i32, service_fee_rate: f64, tax_rate: f64) -> UpdateSettingsRequest {
        UpdateSettingsRequest {
            commission_bps,
            service_fee_rate,
            tax_rate,
        }
    }

    #[test]
    fn settings_bounds() {
        assert!(request(0, 0.0, 0.0).validate().is_ok());
        assert!(request(10_000, 1.0, 1.0).validate().is_ok());
        assert!(request(10_001, 0.1, 0.1).validate().is_err());
        assert!(request(-1, 0.1, 0.1).validate().is_err());
        assert!(request(1000, 1.5, 0.1).validate().is_err());
        assert!(request(1000, 0.1, f64::NAN).validate().is_err());
    }
}
