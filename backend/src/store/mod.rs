use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Booking, Category, CommissionTransaction, Conversation, Message, Payment, PlatformSettings,
    Profile, Property, Review,
};

#[cfg(test)]
pub mod memory;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database connection failed: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Database error: {0}")]
    Query(#[from] diesel::result::Error),

    /// A uniqueness constraint rejected the write.
    #[error("{0}")]
    Conflict(String),

    #[error("Database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Default)]
pub struct PropertyFilter {
    pub category: Option<Category>,
    pub city: Option<String>,
}

/// Persistence seam for everything the handlers and the booking workflow read
/// or write. Writes are independent statements; nothing spans two calls.
#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<Profile>>;

    async fn list_properties(&self, filter: PropertyFilter) -> StoreResult<Vec<Property>>;
    async fn get_property(&self, id: Uuid) -> StoreResult<Option<Property>>;
    async fn insert_property(&self, property: Property) -> StoreResult<Property>;

    async fn insert_payment(&self, payment: Payment) -> StoreResult<Payment>;
    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>>;
    async fn find_payment_by_session(&self, session_id: &str) -> StoreResult<Option<Payment>>;
    async fn update_payment(&self, payment: Payment) -> StoreResult<Payment>;

    /// Fails with [`StoreError::Conflict`] if the payment already has a booking.
    async fn insert_booking(&self, booking: Booking) -> StoreResult<Booking>;
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;
    async fn find_booking_by_payment(&self, payment_id: Uuid) -> StoreResult<Option<Booking>>;
    async fn update_booking(&self, booking: Booking) -> StoreResult<Booking>;
    async fn list_guest_bookings(&self, guest_id: Uuid) -> StoreResult<Vec<Booking>>;
    async fn list_host_bookings(&self, host_id: Uuid) -> StoreResult<Vec<Booking>>;
    /// Confirmed bookings whose stay intersects `[check_in, check_out)`.
    async fn has_overlapping_booking(
        &self,
        property_id: Uuid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> StoreResult<bool>;

    async fn insert_commission(&self, commission: CommissionTransaction) -> StoreResult<CommissionTransaction>;
    async fn find_commission_by_payment(&self, payment_id: Uuid) -> StoreResult<Option<CommissionTransaction>>;
    async fn update_commission(&self, commission: CommissionTransaction) -> StoreResult<CommissionTransaction>;
    async fn list_commissions(&self) -> StoreResult<Vec<CommissionTransaction>>;

    /// Falls back to [`PlatformSettings::defaults`] until an admin saves settings.
    async fn get_settings(&self) -> StoreResult<PlatformSettings>;
    async fn save_settings(&self, settings: PlatformSettings) -> StoreResult<PlatformSettings>;

    async fn insert_review(&self, review: Review) -> StoreResult<Review>;
    async fn list_reviews(&self, property_id: Uuid) -> StoreResult<Vec<Review>>;
    async fn find_review_by_booking(&self, booking_id: Uuid) -> StoreResult<Option<Review>>;

    async fn find_conversation(&self, property_id: Uuid, guest_id: Uuid) -> StoreResult<Option<Conversation>>;
    async fn get_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>>;
    /// Fails with [`StoreError::Conflict`] if the guest already has a thread on the property.
    async fn insert_conversation(&self, conversation: Conversation) -> StoreResult<Conversation>;
    async fn insert_message(&self, message: Message) -> StoreResult<Message>;
    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>>;
    /// Marks messages not sent by `reader_id` as read; returns how many changed.
    async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid, now: DateTime<Utc>) -> StoreResult<usize>;
    async fn unread_count(&self, user_id: Uuid) -> StoreResult<i64>;
}
