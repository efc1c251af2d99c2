//! Nightly price normalization, booking quotes and the platform commission split.
//!
//! Amounts are plain `f64` in the transaction currency, rounded to cents at
//! each step. They only become integer minor units at the payment provider
//! boundary (see [`to_minor_units`]).

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Category, PlatformSettings, PriceType, Property};

pub const BOOKING_FEE_RATE: f64 = 0.05;
pub const SECURITY_DEPOSIT_RATE: f64 = 0.20;
/// Smallest amount the provider will charge.
pub const MINIMUM_CHARGE: f64 = 1.00;
pub const DAYS_PER_MONTH: f64 = 30.44;
pub const DAYS_PER_WEEK: f64 = 7.0;
pub const MAX_COMMISSION_BPS: i32 = 10_000;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Nightly rate for a listing. Weekly and monthly short-stay prices are
/// spread across their days; every other price is returned unchanged.
/// Missing or nonsensical prices count as free rather than failing.
pub fn normalize_nightly_price(price: Option<f64>, price_type: PriceType, category: Category) -> f64 {
    let price = match price {
        Some(p) if p.is_finite() && p > 0.0 => p,
        _ => return 0.0,
    };

    if category != Category::ShortStay {
        return price;
    }

    match price_type {
        PriceType::Monthly => price / DAYS_PER_MONTH,
        PriceType::Weekly => price / DAYS_PER_WEEK,
        PriceType::Daily => price,
    }
}

/// `max(1, nights)` once both dates are picked, 0 before that.
pub fn night_count(check_in: Option<NaiveDate>, check_out: Option<NaiveDate>) -> i64 {
    match (check_in, check_out) {
        (Some(check_in), Some(check_out)) => (check_out - check_in).num_days().max(1),
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingQuote {
    pub nightly_price: f64,
    pub nights: i64,
    pub subtotal: f64,
    pub booking_fee: f64,
    pub security_deposit: f64,
    pub total: f64,
    /// `subtotal + booking_fee` before the minimum-charge floor is applied.
    #[serde(skip)]
    raw_total: f64,
}

impl BookingQuote {
    pub fn compute(nightly_price: f64, nights: i64) -> Self {
        let subtotal = round2(nightly_price * nights.max(0) as f64);
        let booking_fee = round2(subtotal * BOOKING_FEE_RATE);
        let security_deposit = round2(subtotal * SECURITY_DEPOSIT_RATE);
        let raw_total = round2(subtotal + booking_fee);

        Self {
            nightly_price: round2(nightly_price),
            nights,
            subtotal,
            booking_fee,
            security_deposit: security_deposit.max(MINIMUM_CHARGE),
            total: raw_total.max(MINIMUM_CHARGE),
            raw_total,
        }
    }

    pub fn for_property(property: &Property, nights: i64) -> Self {
        let nightly = normalize_nightly_price(Some(property.price), property.price_type, property.category);
        Self::compute(nightly, nights)
    }

    /// Payment actions stay disabled until the real total reaches the minimum charge.
    pub fn is_chargeable(&self) -> bool {
        self.raw_total >= MINIMUM_CHARGE
    }
}

/// Per-property and platform-wide extras layered on top of a quote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSchedule {
    pub cleaning_fee: f64,
    pub service_fee_rate: f64,
    pub tax_rate: f64,
}

impl FeeSchedule {
    pub fn new(property: &Property, settings: &PlatformSettings) -> Self {
        Self {
            cleaning_fee: property.cleaning_fee.max(0.0),
            service_fee_rate: settings.service_fee_rate,
            tax_rate: settings.tax_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    #[serde(flatten)]
    pub quote: BookingQuote,
    pub cleaning_fee: f64,
    pub service_fee: f64,
    pub taxes: f64,
    pub grand_total: f64,
    pub chargeable: bool,
}

impl PriceBreakdown {
    pub fn from_quote(quote: BookingQuote, fees: &FeeSchedule) -> Self {
        // Nothing to clean or tax before any nights are picked.
        if quote.nights == 0 {
            return Self {
                quote,
                cleaning_fee: 0.0,
                service_fee: 0.0,
                taxes: 0.0,
                grand_total: quote.total,
                chargeable: false,
            };
        }

        let cleaning_fee = round2(fees.cleaning_fee);
        let service_fee = round2(quote.subtotal * fees.service_fee_rate);
        let taxes = round2((quote.subtotal + cleaning_fee + service_fee) * fees.tax_rate);
        let grand_total = round2(quote.total + cleaning_fee + service_fee + taxes);

        Self {
            quote,
            cleaning_fee,
            service_fee,
            taxes,
            grand_total,
            chargeable: quote.is_chargeable(),
        }
    }
}

/// Platform cut of a booking subtotal, in basis points like the listing fee
/// on the marketplace account.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionSplit {
    pub gross: f64,
    pub commission: f64,
    pub host_amount: f64,
    pub commission_bps: i32,
}

impl CommissionSplit {
    pub fn compute(gross: f64, commission_bps: i32) -> Self {
        let bps = commission_bps.clamp(0, MAX_COMMISSION_BPS);
        let commission = round2(gross * f64::from(bps) / f64::from(MAX_COMMISSION_BPS));
        Self {
            gross,
            commission,
            host_amount: round2(gross - commission),
            commission_bps: bps,
        }
    }

    /// Host share to claw back when `fraction` of the payment is refunded.
    pub fn host_reversal(host_amount: f64, fraction: f64) -> f64 {
        round2(host_amount * fraction.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn weekly_short_stay_is_divided_by_seven() {
        for base in [70.0, 99.99, 1234.5] {
            let nightly = normalize_nightly_price(Some(base), PriceType::Weekly, Category::ShortStay);
            assert_eq!(nightly, base / 7.0);
        }
    }

    #[test]
    fn monthly_short_stay_uses_average_month() {
        let nightly = normalize_nightly_price(Some(3044.0), PriceType::Monthly, Category::ShortStay);
        assert!((nightly - 100.0).abs() < 1e-9);
    }

    #[test]
    fn non_short_stay_prices_are_untouched() {
        assert_eq!(normalize_nightly_price(Some(2000.0), PriceType::Monthly, Category::Rent), 2000.0);
        assert_eq!(normalize_nightly_price(Some(80.0), PriceType::Daily, Category::ShortStay), 80.0);
    }

    #[test]
    fn missing_or_zero_price_is_free() {
        assert_eq!(normalize_nightly_price(None, PriceType::Daily, Category::ShortStay), 0.0);
        assert_eq!(normalize_nightly_price(Some(0.0), PriceType::Weekly, Category::ShortStay), 0.0);
        assert_eq!(normalize_nightly_price(Some(f64::NAN), PriceType::Daily, Category::ShortStay), 0.0);
    }

    #[test]
    fn night_count_needs_both_dates_and_is_at_least_one() {
        assert_eq!(night_count(Some(date("2026-05-01")), Some(date("2026-05-04"))), 3);
        assert_eq!(night_count(Some(date("2026-05-01")), Some(date("2026-05-01"))), 1);
        assert_eq!(night_count(Some(date("2026-05-01")), None), 0);
        assert_eq!(night_count(None, None), 0);
    }

    #[test]
    fn total_is_subtotal_plus_booking_fee() {
        for (nightly, nights) in [(85.0, 3), (123.45, 7), (10.0 / 7.0, 5), (999.99, 30)] {
            let quote = BookingQuote::compute(nightly, nights);
            assert_eq!(quote.booking_fee, round2(quote.subtotal * 0.05));
            assert_eq!(quote.security_deposit, round2(quote.subtotal * 0.20).max(MINIMUM_CHARGE));
            assert_eq!(quote.total, round2(quote.subtotal + quote.booking_fee));
            assert!(quote.is_chargeable());
        }
    }

    #[test]
    fn quote_example_values() {
        let quote = BookingQuote::compute(100.0, 3);
        assert_eq!(quote.subtotal, 300.0);
        assert_eq!(quote.booking_fee, 15.0);
        assert_eq!(quote.security_deposit, 60.0);
        assert_eq!(quote.total, 315.0);
    }

    #[test]
    fn tiny_quotes_are_floored_and_not_chargeable() {
        let quote = BookingQuote::compute(0.5, 1);
        assert_eq!(quote.total, MINIMUM_CHARGE);
        assert_eq!(quote.security_deposit, MINIMUM_CHARGE);
        assert!(!quote.is_chargeable());

        let empty = BookingQuote::compute(120.0, 0);
        assert_eq!(empty.subtotal, 0.0);
        assert!(!empty.is_chargeable());
    }

    fn property(price: f64, price_type: PriceType, cleaning_fee: f64) -> Property {
        let now = Utc::now();
        Property {
            id: Uuid::new_v4(),
            host_id: Uuid::new_v4(),
            title: "Loft".into(),
            description: String::new(),
            category: Category::ShortStay,
            price,
            price_type,
            cleaning_fee,
            city: "Lisbon".into(),
            address: "Rua Augusta 1".into(),
            bedrooms: 1,
            bathrooms: 1,
            max_guests: 2,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn breakdown_without_rates_matches_quote_total() {
        let prop = property(700.0, PriceType::Weekly, 0.0);
        let settings = PlatformSettings::defaults(Utc::now());
        let quote = BookingQuote::for_property(&prop, 2);
        let breakdown = PriceBreakdown::from_quote(quote, &FeeSchedule::new(&prop, &settings));
        assert_eq!(quote.subtotal, 200.0);
        assert_eq!(breakdown.grand_total, quote.total);
        assert!(breakdown.chargeable);
    }

    #[test]
    fn breakdown_adds_cleaning_service_and_tax() {
        let prop = property(100.0, PriceType::Daily, 40.0);
        let mut settings = PlatformSettings::defaults(Utc::now());
        settings.service_fee_rate = 0.10;
        settings.tax_rate = 0.05;

        let quote = BookingQuote::for_property(&prop, 2);
        let breakdown = PriceBreakdown::from_quote(quote, &FeeSchedule::new(&prop, &settings));

        assert_eq!(breakdown.service_fee, 20.0);
        assert_eq!(breakdown.taxes, 13.0);
        assert_eq!(breakdown.grand_total, 210.0 + 40.0 + 20.0 + 13.0);
    }

    #[test]
    fn commission_split_uses_basis_points() {
        let split = CommissionSplit::compute(1000.0, 1500);
        assert_eq!(split.commission, 150.0);
        assert_eq!(split.host_amount, 850.0);

        let capped = CommissionSplit::compute(100.0, 20_000);
        assert_eq!(capped.commission, 100.0);
        assert_eq!(capped.host_amount, 0.0);
    }

    #[test]
    fn host_reversal_is_proportional() {
        assert_eq!(CommissionSplit::host_reversal(850.0, 0.5), 425.0);
        assert_eq!(CommissionSplit::host_reversal(850.0, 1.5), 850.0);
    }

    #[test]
    fn minor_units_round_to_nearest_cent() {
        assert_eq!(to_minor_units(315.0), 31_500);
        assert_eq!(to_minor_units(0.1 + 0.2), 30);
    }
}
