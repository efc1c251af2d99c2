use chrono::{DateTime, NaiveDate, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

/// Declares a string-backed enum stored in a `Varchar` column.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
        #[diesel(sql_type = Text)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} value: {}", stringify!($name), other)),
                }
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                raw.parse::<$name>().map_err(Into::into)
            }
        }
    };
}

text_enum!(Role {
    Guest => "guest",
    Host => "host",
    Admin => "admin",
});

text_enum!(
    /// Listing category. Only short stays are priced per night.
    Category {
        ShortStay => "short_stay",
        Rent => "rent",
        Sale => "sale",
    }
);

text_enum!(PriceType {
    Daily => "daily",
    Weekly => "weekly",
    Monthly => "monthly",
});

text_enum!(PaymentType {
    Booking => "booking",
    Deposit => "deposit",
});

text_enum!(PaymentStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Refunded => "refunded",
    PartiallyRefunded => "partially_refunded",
});

text_enum!(BookingStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Cancelled => "cancelled",
    Completed => "completed",
});

text_enum!(CommissionStatus {
    Held => "held",
    Transferred => "transferred",
    Reversed => "reversed",
});

impl BookingStatus {
    /// `Cancelled` and `Completed` are terminal.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = crate::schema::profiles)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub payout_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = crate::schema::properties)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: Uuid,
    pub host_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub price: f64,
    pub price_type: PriceType,
    pub cleaning_fee: f64,
    pub city: String,
    pub address: String,
    pub bedrooms: i16,
    pub bathrooms: i16,
    pub max_guests: i16,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::payments, treat_none_as_null = true)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub property_id: Uuid,
    pub payment_type: PaymentType,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider_session_id: Option<String>,
    pub provider_payment_intent: Option<String>,
    pub refund_id: Option<String>,
    pub refund_amount: f64,
    pub booking_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::bookings, treat_none_as_null = true)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub property_id: Uuid,
    pub guest_id: Uuid,
    pub payment_id: Option<Uuid>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i16,
    pub nights: i32,
    pub total_price: f64,
    pub security_deposit: f64,
    pub status: BookingStatus,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn transition(&mut self, next: BookingStatus, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Check-in is taken at midnight UTC of the check-in date.
    pub fn check_in_at(&self) -> DateTime<Utc> {
        self.check_in.and_time(chrono::NaiveTime::default()).and_utc()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("booking cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: BookingStatus,
    pub to: BookingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::commission_transactions, treat_none_as_null = true)]
#[serde(rename_all = "camelCase")]
pub struct CommissionTransaction {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub host_id: Uuid,
    pub gross_amount: f64,
    pub commission_amount: f64,
    pub host_amount: f64,
    pub commission_bps: i32,
    pub transfer_id: Option<String>,
    pub reversed_amount: f64,
    pub status: CommissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::platform_settings)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSettings {
    pub id: i32,
    pub commission_bps: i32,
    pub service_fee_rate: f64,
    pub tax_rate: f64,
    pub updated_at: DateTime<Utc>,
}

impl PlatformSettings {
    pub const SINGLETON_ID: i32 = 1;

    /// 10% commission and no service fee or tax.
    pub fn defaults(now: DateTime<Utc>) -> Self {
        Self {
            id: Self::SINGLETON_ID,
            commission_bps: 1000,
            service_fee_rate: 0.0,
            tax_rate: 0.0,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = crate::schema::reviews)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub property_id: Uuid,
    pub booking_id: Uuid,
    pub author_id: Uuid,
    pub rating: i16,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = crate::schema::conversations)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub property_id: Uuid,
    pub guest_id: Uuid,
    pub host_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.guest_id == user_id || self.host_id == user_id
    }

    pub fn other_participant(&self, user_id: Uuid) -> Uuid {
        if self.guest_id == user_id {
            self.host_id
        } else {
            self.guest_id
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = crate::schema::messages)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Dates and amounts captured at checkout, kept on the payment row until a
/// booking is materialized from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSnapshot {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i16,
    pub nights: i32,
    pub subtotal: f64,
    pub security_deposit: f64,
}
