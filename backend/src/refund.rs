//! Cancellation refund tiers. The preview endpoint and the authoritative
//! refund both call [`RefundTier::evaluate`], so the thresholds live here only.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pricing::round2;

const HOUR_SECS: i64 = 60 * 60;
/// Inside this window nothing is refunded.
pub const NO_REFUND_WINDOW_HOURS: i64 = 24;
/// Inside this window (and outside the one above) half is refunded.
pub const PARTIAL_REFUND_WINDOW_HOURS: i64 = 7 * 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundTier {
    None,
    Partial,
    Full,
}

impl RefundTier {
    pub fn evaluate(check_in: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let secs_until = (check_in - now).num_seconds();
        if secs_until < NO_REFUND_WINDOW_HOURS * HOUR_SECS {
            RefundTier::None
        } else if secs_until < PARTIAL_REFUND_WINDOW_HOURS * HOUR_SECS {
            RefundTier::Partial
        } else {
            RefundTier::Full
        }
    }

    pub fn percent(self) -> u8 {
        match self {
            RefundTier::None => 0,
            RefundTier::Partial => 50,
            RefundTier::Full => 100,
        }
    }

    /// Never more than `refundable`, never negative.
    pub fn refund_amount(self, refundable: f64) -> f64 {
        let refundable = refundable.max(0.0);
        round2(refundable * f64::from(self.percent()) / 100.0).clamp(0.0, refundable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundQuote {
    pub tier: RefundTier,
    pub percent: u8,
    pub hours_until_check_in: i64,
    pub refund_amount: f64,
}

impl RefundQuote {
    pub fn new(check_in: DateTime<Utc>, now: DateTime<Utc>, refundable: f64) -> Self {
        let tier = RefundTier::evaluate(check_in, now);
        Self {
            tier,
            percent: tier.percent(),
            hours_until_check_in: (check_in - now).num_hours(),
            refund_amount: tier.refund_amount(refundable),
        }
    }
}
