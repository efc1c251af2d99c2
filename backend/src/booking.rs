//! Checkout, verification, cancellation and refund of bookings.
//!
//! Each operation is a sequence of independent store writes and provider
//! calls. Commission bookkeeping after a refund is best effort: failures are
//! logged and the refund still completes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::events::{EventHub, MarketplaceEvent};
use crate::models::{
    Booking, BookingSnapshot, BookingStatus, Category, CommissionStatus, CommissionTransaction, Payment,
    PaymentStatus, PaymentType, Property,
};
use crate::payments::{CheckoutRequest, PaymentGateway};
use crate::pricing::{
    night_count, to_minor_units, BookingQuote, CommissionSplit, FeeSchedule, PriceBreakdown, MINIMUM_CHARGE,
};
use crate::refund::{RefundQuote, RefundTier};
use crate::store::{MarketplaceStore, StoreError};

/// Client-side totals may differ from ours by at most a cent.
const AMOUNT_TOLERANCE: f64 = 0.01;

fn one_guest() -> i16 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingData {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default = "one_guest")]
    pub guests: i16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub property_id: Uuid,
    pub payment_type: PaymentType,
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    pub booking_data: BookingData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub url: String,
    pub payment_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub status: PaymentStatus,
    pub booking_id: Option<Uuid>,
    pub booking_status: Option<BookingStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBookingRequest {
    pub booking_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRefundRequest {
    pub payment_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub success: bool,
    pub refund_amount: f64,
    pub tier: RefundTier,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasePayoutResponse {
    pub transfer_id: String,
    pub amount: f64,
}

pub struct BookingService {
    store: Arc<dyn MarketplaceStore>,
    gateway: Arc<dyn PaymentGateway>,
    events: EventHub,
    config: Arc<AppConfig>,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        gateway: Arc<dyn PaymentGateway>,
        events: EventHub,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            gateway,
            events,
            config,
        }
    }

    /// Quotes the stay again on our side, records a pending payment and opens
    /// a hosted checkout session for it.
    pub async fn create_payment(
        &self,
        user: AuthUser,
        request: CreatePaymentRequest,
        now: DateTime<Utc>,
    ) -> Result<CreatePaymentResponse, AppError> {
        let property = self
            .store
            .get_property(request.property_id)
            .await?
            .ok_or(AppError::NotFound("Property"))?;

        if !property.is_active {
            return Err(AppError::Conflict("Property is not available for booking".to_string()));
        }
        if property.host_id == user.id {
            return Err(AppError::Validation("You cannot book your own property".to_string()));
        }
        if property.category != Category::ShortStay {
            return Err(AppError::Validation("Only short-stay listings can be booked online".to_string()));
        }
        validate_stay(&property, &request.booking_data, now)?;

        let stay = &request.booking_data;
        if self
            .store
            .has_overlapping_booking(property.id, stay.check_in, stay.check_out)
            .await?
        {
            return Err(AppError::Conflict("Property is already booked for these dates".to_string()));
        }

        let nights = night_count(Some(stay.check_in), Some(stay.check_out));
        let quote = BookingQuote::for_property(&property, nights);
        if !quote.is_chargeable() {
            return Err(AppError::Validation(format!(
                "Total is below the minimum charge of {:.2}",
                MINIMUM_CHARGE
            )));
        }
        let settings = self.store.get_settings().await?;
        let breakdown = PriceBreakdown::from_quote(quote, &FeeSchedule::new(&property, &settings));

        let expected = match request.payment_type {
            PaymentType::Booking => breakdown.grand_total,
            PaymentType::Deposit => quote.security_deposit,
        };
        if (request.amount - expected).abs() > AMOUNT_TOLERANCE {
            return Err(AppError::Validation(format!(
                "Amount {:.2} does not match the current price {:.2}",
                request.amount, expected
            )));
        }

        let currency = self.config.payment_currency.to_lowercase();
        if let Some(requested) = request.currency.as_deref() {
            if !requested.eq_ignore_ascii_case(&currency) {
                return Err(AppError::Validation(format!(
                    "Payments are only accepted in {}",
                    currency.to_uppercase()
                )));
            }
        }
        let snapshot = BookingSnapshot {
            check_in: stay.check_in,
            check_out: stay.check_out,
            guests: stay.guests,
            nights: nights as i32,
            subtotal: quote.subtotal,
            security_deposit: quote.security_deposit,
        };
        let booking_data = serde_json::to_value(&snapshot).map_err(|e| AppError::Internal(e.to_string()))?;

        let mut payment = self
            .store
            .insert_payment(Payment {
                id: Uuid::new_v4(),
                user_id: user.id,
                property_id: property.id,
                payment_type: request.payment_type,
                amount: expected,
                currency: currency.clone(),
                status: PaymentStatus::Pending,
                provider_session_id: None,
                provider_payment_intent: None,
                refund_id: None,
                refund_amount: 0.0,
                booking_data,
                created_at: now,
                updated_at: now,
            })
            .await?;

        let customer_email = self.store.get_profile(user.id).await?.map(|p| p.email);
        let product_name = match request.payment_type {
            PaymentType::Booking => format!("{} ({} nights)", property.title, nights),
            PaymentType::Deposit => format!("{} (security deposit)", property.title),
        };
        let checkout = CheckoutRequest {
            amount_minor: to_minor_units(expected),
            currency,
            product_name,
            success_url: self.config.checkout_success_url(),
            cancel_url: self.config.checkout_cancel_url(property.id),
            customer_email,
            metadata: HashMap::from([
                ("payment_id".to_string(), payment.id.to_string()),
                ("property_id".to_string(), property.id.to_string()),
                ("user_id".to_string(), user.id.to_string()),
            ]),
        };

        let session = match self.gateway.create_checkout_session(&checkout).await {
            Ok(session) => session,
            Err(e) => {
                log::error!("Checkout session for payment {} failed: {}", payment.id, e);
                payment.status = PaymentStatus::Failed;
                payment.updated_at = now;
                self.store.update_payment(payment).await?;
                return Err(e.into());
            }
        };

        let url = session
            .url
            .clone()
            .ok_or_else(|| AppError::Internal("Payment provider returned no checkout URL".to_string()))?;
        payment.provider_session_id = Some(session.id);
        payment.updated_at = now;
        let payment = self.store.update_payment(payment).await?;

        log::info!(
            "Created {} payment {} of {:.2} {} for property {}",
            payment.payment_type,
            payment.id,
            payment.amount,
            payment.currency,
            property.id
        );
        Ok(CreatePaymentResponse {
            url,
            payment_id: payment.id,
        })
    }

    /// Settles a returning checkout session. Safe to call repeatedly: a
    /// payment never produces more than one booking, and an existing booking
    /// is reported as-is.
    pub async fn verify_payment(
        &self,
        user: AuthUser,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifyPaymentResponse, AppError> {
        let mut payment = self
            .store
            .find_payment_by_session(session_id)
            .await?
            .ok_or(AppError::NotFound("Payment"))?;
        if payment.user_id != user.id && !user.is_admin() {
            return Err(AppError::Forbidden("This payment belongs to another user".to_string()));
        }

        if let Some(existing) = self.store.find_booking_by_payment(payment.id).await? {
            return Ok(VerifyPaymentResponse {
                success: true,
                status: payment.status,
                booking_id: Some(existing.id),
                booking_status: Some(existing.status),
            });
        }
        if payment.status == PaymentStatus::Failed {
            return Ok(unsettled(&payment));
        }

        let session = self.gateway.retrieve_checkout_session(session_id).await?;
        if !session.is_paid() {
            if session.is_expired() && payment.status == PaymentStatus::Pending {
                payment.status = PaymentStatus::Failed;
                payment.updated_at = now;
                payment = self.store.update_payment(payment).await?;
                log::info!("Checkout session {} expired, payment {} failed", session_id, payment.id);
            }
            return Ok(unsettled(&payment));
        }

        if payment.status == PaymentStatus::Pending {
            payment.status = PaymentStatus::Completed;
            payment.provider_payment_intent = session.payment_intent.clone();
            payment.updated_at = now;
            payment = self.store.update_payment(payment).await?;
        }
        // Refunded before any booking existed.
        if payment.status != PaymentStatus::Completed {
            return Ok(unsettled(&payment));
        }

        let snapshot: BookingSnapshot = serde_json::from_value(payment.booking_data.clone())
            .map_err(|e| AppError::Internal(format!("Corrupt booking data on payment {}: {}", payment.id, e)))?;
        let property = self
            .store
            .get_property(payment.property_id)
            .await?
            .ok_or(AppError::NotFound("Property"))?;

        // Another guest may have settled the same dates while this checkout was open.
        if self
            .store
            .has_overlapping_booking(property.id, snapshot.check_in, snapshot.check_out)
            .await?
        {
            log::warn!(
                "Dates of payment {} were booked while checkout was open, refunding in full",
                payment.id
            );
            let payment = self.refund_in_full(payment, now).await?;
            return Ok(unsettled(&payment));
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            property_id: payment.property_id,
            guest_id: payment.user_id,
            payment_id: Some(payment.id),
            check_in: snapshot.check_in,
            check_out: snapshot.check_out,
            guests: snapshot.guests,
            nights: snapshot.nights,
            total_price: payment.amount,
            security_deposit: snapshot.security_deposit,
            status: BookingStatus::Confirmed,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };

        let booking = match self.store.insert_booking(booking).await {
            Ok(booking) => {
                log::info!("Confirmed booking {} for payment {}", booking.id, payment.id);
                if payment.payment_type == PaymentType::Booking {
                    if let Err(e) = self.record_commission(&payment, &booking, &property, snapshot.subtotal, now).await {
                        log::warn!("Commission for payment {} not recorded: {}", payment.id, e);
                    }
                }
                self.events.publish(MarketplaceEvent::BookingStatusChanged {
                    user_id: property.host_id,
                    booking_id: booking.id,
                    status: booking.status,
                });
                booking
            }
            // Lost a race with a concurrent verification of the same session.
            Err(StoreError::Conflict(_)) => self
                .store
                .find_booking_by_payment(payment.id)
                .await?
                .ok_or(AppError::NotFound("Booking"))?,
            Err(e) => return Err(e.into()),
        };

        Ok(VerifyPaymentResponse {
            success: true,
            status: payment.status,
            booking_id: Some(booking.id),
            booking_status: Some(booking.status),
        })
    }

    /// Returns the whole charge of a payment that never became a booking.
    async fn refund_in_full(&self, mut payment: Payment, now: DateTime<Utc>) -> Result<Payment, AppError> {
        let payment_intent = payment
            .provider_payment_intent
            .clone()
            .ok_or_else(|| AppError::Conflict("Payment has no captured charge to refund".to_string()))?;
        let receipt = self
            .gateway
            .create_refund(&payment_intent, to_minor_units(payment.amount))
            .await?;
        log::info!(
            "Refunded {:.2} {} on payment {} as {}",
            payment.amount,
            payment.currency,
            payment.id,
            receipt.id
        );

        payment.refund_id = Some(receipt.id);
        payment.refund_amount = payment.amount;
        payment.status = PaymentStatus::Refunded;
        payment.updated_at = now;
        Ok(self.store.update_payment(payment).await?)
    }

    async fn record_commission(
        &self,
        payment: &Payment,
        booking: &Booking,
        property: &Property,
        subtotal: f64,
        now: DateTime<Utc>,
    ) -> Result<CommissionTransaction, AppError> {
        let settings = self.store.get_settings().await?;
        let split = CommissionSplit::compute(subtotal, settings.commission_bps);
        let commission = self
            .store
            .insert_commission(CommissionTransaction {
                id: Uuid::new_v4(),
                payment_id: payment.id,
                booking_id: booking.id,
                host_id: property.host_id,
                gross_amount: split.gross,
                commission_amount: split.commission,
                host_amount: split.host_amount,
                commission_bps: split.commission_bps,
                transfer_id: None,
                reversed_amount: 0.0,
                status: CommissionStatus::Held,
                created_at: now,
                updated_at: now,
            })
            .await?;
        Ok(commission)
    }

    pub async fn cancel_booking(
        &self,
        user: AuthUser,
        request: CancelBookingRequest,
        now: DateTime<Utc>,
    ) -> Result<RefundResponse, AppError> {
        let mut booking = self
            .store
            .get_booking(request.booking_id)
            .await?
            .ok_or(AppError::NotFound("Booking"))?;
        let property = self
            .store
            .get_property(booking.property_id)
            .await?
            .ok_or(AppError::NotFound("Property"))?;
        authorize_booking_actor(user, booking.guest_id, &property)?;
        ensure_cancellable(&booking)?;

        let payment = match booking.payment_id {
            Some(payment_id) => self.store.get_payment(payment_id).await?,
            None => None,
        };

        match payment {
            Some(payment) if payment.status == PaymentStatus::Completed => {
                self.refund_and_cancel(payment, Some(booking), &property, request.reason, now)
                    .await
            }
            _ => {
                let tier = RefundTier::evaluate(booking.check_in_at(), now);
                booking.transition(BookingStatus::Cancelled, now)?;
                booking.cancellation_reason = request.reason;
                let booking = self.store.update_booking(booking).await?;
                self.announce_cancellation(&booking, &property);
                log::info!("Cancelled unpaid booking {}", booking.id);
                Ok(RefundResponse {
                    success: true,
                    refund_amount: 0.0,
                    tier,
                })
            }
        }
    }

    pub async fn process_refund(
        &self,
        user: AuthUser,
        request: ProcessRefundRequest,
        now: DateTime<Utc>,
    ) -> Result<RefundResponse, AppError> {
        let payment = self
            .store
            .get_payment(request.payment_id)
            .await?
            .ok_or(AppError::NotFound("Payment"))?;
        let property = self
            .store
            .get_property(payment.property_id)
            .await?
            .ok_or(AppError::NotFound("Property"))?;
        authorize_booking_actor(user, payment.user_id, &property)?;

        if payment.status != PaymentStatus::Completed {
            return Err(AppError::Conflict(format!(
                "Payment is not refundable in status {}",
                payment.status
            )));
        }

        let booking = self.store.find_booking_by_payment(payment.id).await?;
        if let Some(booking) = &booking {
            if booking.status != BookingStatus::Cancelled {
                ensure_cancellable(booking)?;
            }
        }
        self.refund_and_cancel(payment, booking, &property, request.reason, now)
            .await
    }

    async fn refund_and_cancel(
        &self,
        mut payment: Payment,
        booking: Option<Booking>,
        property: &Property,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<RefundResponse, AppError> {
        let check_in_at = match &booking {
            Some(booking) => booking.check_in_at(),
            None => {
                let snapshot: BookingSnapshot = serde_json::from_value(payment.booking_data.clone())
                    .map_err(|e| AppError::Internal(format!("Corrupt booking data on payment {}: {}", payment.id, e)))?;
                snapshot.check_in.and_time(chrono::NaiveTime::default()).and_utc()
            }
        };

        let tier = RefundTier::evaluate(check_in_at, now);
        let refund_amount = tier.refund_amount(payment.amount);

        if refund_amount > 0.0 {
            let payment_intent = payment
                .provider_payment_intent
                .clone()
                .ok_or_else(|| AppError::Conflict("Payment has no captured charge to refund".to_string()))?;
            let receipt = self
                .gateway
                .create_refund(&payment_intent, to_minor_units(refund_amount))
                .await?;
            log::info!(
                "Refunded {:.2} {} ({}%) on payment {} as {}",
                refund_amount,
                payment.currency,
                tier.percent(),
                payment.id,
                receipt.id
            );

            payment.refund_id = Some(receipt.id);
            payment.refund_amount = refund_amount;
            payment.status = if refund_amount >= payment.amount {
                PaymentStatus::Refunded
            } else {
                PaymentStatus::PartiallyRefunded
            };
            payment.updated_at = now;

            if let Err(e) = self.reverse_commission(payment.id, refund_amount / payment.amount, now).await {
                log::warn!("Commission reversal for payment {} failed: {}", payment.id, e);
            }
            payment = self.store.update_payment(payment).await?;
        }

        if let Some(mut booking) = booking {
            if booking.status != BookingStatus::Cancelled {
                booking.transition(BookingStatus::Cancelled, now)?;
                booking.cancellation_reason = reason;
                let booking = self.store.update_booking(booking).await?;
                self.announce_cancellation(&booking, property);
                log::info!("Cancelled booking {} (payment {})", booking.id, payment.id);
            }
        }

        Ok(RefundResponse {
            success: true,
            refund_amount,
            tier,
        })
    }

    /// Claws back the refunded share of the host payout, if one was sent.
    async fn reverse_commission(&self, payment_id: Uuid, fraction: f64, now: DateTime<Utc>) -> Result<(), AppError> {
        let Some(mut commission) = self.store.find_commission_by_payment(payment_id).await? else {
            return Ok(());
        };
        if commission.status == CommissionStatus::Reversed {
            return Ok(());
        }

        let reversal = CommissionSplit::host_reversal(commission.host_amount, fraction);
        if let Some(transfer_id) = commission.transfer_id.clone() {
            if reversal > 0.0 {
                let receipt = self
                    .gateway
                    .reverse_transfer(&transfer_id, to_minor_units(reversal))
                    .await?;
                log::info!("Reversed {:.2} of transfer {} as {}", reversal, transfer_id, receipt.id);
            }
        }

        commission.reversed_amount = reversal;
        commission.status = CommissionStatus::Reversed;
        commission.updated_at = now;
        self.store.update_commission(commission).await?;
        Ok(())
    }

    /// Escrow release: pays the host share of a settled booking out to the
    /// host's connected account. Stays cancelled without a refund are paid too.
    pub async fn release_payout(
        &self,
        user: AuthUser,
        payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReleasePayoutResponse, AppError> {
        if !user.is_admin() {
            return Err(AppError::Forbidden("Only admins can release payouts".to_string()));
        }

        let payment = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or(AppError::NotFound("Payment"))?;
        if payment.status != PaymentStatus::Completed {
            return Err(AppError::Conflict(format!(
                "Cannot release a payment in status {}",
                payment.status
            )));
        }
        let booking = self
            .store
            .find_booking_by_payment(payment.id)
            .await?
            .ok_or(AppError::NotFound("Booking"))?;
        // A cancelled booking whose payment is still completed kept no refund.
        if booking.status == BookingStatus::Cancelled {
            log::info!("Releasing forfeited payment {} of cancelled booking {}", payment.id, booking.id);
        }

        let mut commission = self
            .store
            .find_commission_by_payment(payment.id)
            .await?
            .ok_or(AppError::NotFound("Commission record"))?;
        if commission.status != CommissionStatus::Held {
            return Err(AppError::Conflict("Payout was already released".to_string()));
        }

        let host = self
            .store
            .get_profile(commission.host_id)
            .await?
            .ok_or(AppError::NotFound("Host profile"))?;
        let destination = host
            .payout_account_id
            .ok_or_else(|| AppError::Validation("Host has no payout account".to_string()))?;

        let receipt = self
            .gateway
            .create_transfer(
                &destination,
                to_minor_units(commission.host_amount),
                &payment.currency,
                &format!("booking-{}", booking.id),
            )
            .await?;

        commission.transfer_id = Some(receipt.id.clone());
        commission.status = CommissionStatus::Transferred;
        commission.updated_at = now;
        let commission = self.store.update_commission(commission).await?;

        log::info!(
            "Released {:.2} to host {} for payment {} as {}",
            commission.host_amount,
            commission.host_id,
            payment.id,
            receipt.id
        );
        Ok(ReleasePayoutResponse {
            transfer_id: receipt.id,
            amount: commission.host_amount,
        })
    }

    /// What cancelling right now would refund. Uses the same tiering as the
    /// refund itself.
    pub async fn refund_preview(
        &self,
        user: AuthUser,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RefundQuote, AppError> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or(AppError::NotFound("Booking"))?;
        let property = self
            .store
            .get_property(booking.property_id)
            .await?
            .ok_or(AppError::NotFound("Property"))?;
        authorize_booking_actor(user, booking.guest_id, &property)?;

        let refundable = match booking.payment_id {
            Some(payment_id) => self
                .store
                .get_payment(payment_id)
                .await?
                .filter(|p| p.status == PaymentStatus::Completed)
                .map_or(0.0, |p| p.amount),
            None => 0.0,
        };
        Ok(RefundQuote::new(booking.check_in_at(), now, refundable))
    }

    fn announce_cancellation(&self, booking: &Booking, property: &Property) {
        for user_id in [booking.guest_id, property.host_id] {
            self.events.publish(MarketplaceEvent::BookingStatusChanged {
                user_id,
                booking_id: booking.id,
                status: booking.status,
            });
        }
    }
}

fn unsettled(payment: &Payment) -> VerifyPaymentResponse {
    VerifyPaymentResponse {
        success: false,
        status: payment.status,
        booking_id: None,
        booking_status: None,
    }
}

fn validate_stay(property: &Property, stay: &BookingData, now: DateTime<Utc>) -> Result<(), AppError> {
    if stay.check_out <= stay.check_in {
        return Err(AppError::Validation("Check-out must be after check-in".to_string()));
    }
    if stay.check_in < now.date_naive() {
        return Err(AppError::Validation("Check-in date is in the past".to_string()));
    }
    if stay.guests < 1 || stay.guests > property.max_guests {
        return Err(AppError::Validation(format!(
            "Guest count must be between 1 and {}",
            property.max_guests
        )));
    }
    Ok(())
}

/// Guest, listing host or admin.
fn authorize_booking_actor(user: AuthUser, guest_id: Uuid, property: &Property) -> Result<(), AppError> {
    if user.id == guest_id || user.id == property.host_id || user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("You are not a party to this booking".to_string()))
    }
}

fn ensure_cancellable(booking: &Booking) -> Result<(), AppError> {
    match booking.status {
        BookingStatus::Cancelled => Err(AppError::Conflict("Booking is already cancelled".to_string())),
        status if !status.can_transition_to(BookingStatus::Cancelled) => {
            Err(AppError::Conflict(format!("A {} booking cannot be cancelled", status)))
        }
        _ => Ok(()),
    }
}
