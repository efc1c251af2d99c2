//! `MarketplaceStore` over plain vectors, used by the workflow and router tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use super::{MarketplaceStore, PropertyFilter, StoreError, StoreResult};
use crate::models::{
    Booking, BookingStatus, CommissionTransaction, Conversation, Message, Payment, PlatformSettings, Profile,
    Property, Review,
};

#[derive(Default)]
struct Tables {
    profiles: Vec<Profile>,
    properties: Vec<Property>,
    payments: Vec<Payment>,
    bookings: Vec<Booking>,
    commissions: Vec<CommissionTransaction>,
    settings: Option<PlatformSettings>,
    reviews: Vec<Review>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
}

/// Rows a concurrent writer commits just before our next insert of the same kind.
#[derive(Default)]
struct Interleaved {
    booking: Option<Booking>,
    conversation: Option<Conversation>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    interleaved: Mutex<Interleaved>,
}

fn replace<T: Clone>(rows: &mut [T], row: T, same: impl Fn(&T) -> bool) -> StoreResult<T> {
    match rows.iter_mut().find(|r| same(r)) {
        Some(slot) => {
            *slot = row.clone();
            Ok(row)
        }
        None => Err(StoreError::Query(diesel::result::Error::NotFound)),
    }
}

impl MemoryStore {
    pub fn add_profile(&self, profile: Profile) {
        self.tables.lock().unwrap().profiles.push(profile);
    }

    pub fn add_property(&self, property: Property) {
        self.tables.lock().unwrap().properties.push(property);
    }

    pub fn add_booking(&self, booking: Booking) {
        self.tables.lock().unwrap().bookings.push(booking);
    }

    /// The next `insert_booking` finds `winner` already committed.
    pub fn interleave_booking(&self, winner: Booking) {
        self.interleaved.lock().unwrap().booking = Some(winner);
    }

    /// The next `insert_conversation` finds `winner` already committed.
    pub fn interleave_conversation(&self, winner: Conversation) {
        self.interleaved.lock().unwrap().conversation = Some(winner);
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.tables.lock().unwrap().conversations.clone()
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.tables.lock().unwrap().bookings.clone()
    }

    pub fn commissions(&self) -> Vec<CommissionTransaction> {
        self.tables.lock().unwrap().commissions.clone()
    }
}

#[async_trait]
impl MarketplaceStore for MemoryStore {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(self.tables.lock().unwrap().profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn list_properties(&self, filter: PropertyFilter) -> StoreResult<Vec<Property>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .properties
            .iter()
            .filter(|p| p.is_active)
            .filter(|p| filter.category.map_or(true, |c| p.category == c))
            .filter(|p| {
                filter
                    .city
                    .as_deref()
                    .map_or(true, |city| p.city.eq_ignore_ascii_case(city))
            })
            .cloned()
            .collect())
    }

    async fn get_property(&self, id: Uuid) -> StoreResult<Option<Property>> {
        Ok(self.tables.lock().unwrap().properties.iter().find(|p| p.id == id).cloned())
    }

    async fn insert_property(&self, property: Property) -> StoreResult<Property> {
        self.tables.lock().unwrap().properties.push(property.clone());
        Ok(property)
    }

    async fn insert_payment(&self, payment: Payment) -> StoreResult<Payment> {
        self.tables.lock().unwrap().payments.push(payment.clone());
        Ok(payment)
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.tables.lock().unwrap().payments.iter().find(|p| p.id == id).cloned())
    }

    async fn find_payment_by_session(&self, session_id: &str) -> StoreResult<Option<Payment>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .payments
            .iter()
            .find(|p| p.provider_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn update_payment(&self, payment: Payment) -> StoreResult<Payment> {
        let id = payment.id;
        replace(&mut self.tables.lock().unwrap().payments, payment, |p| p.id == id)
    }

    async fn insert_booking(&self, booking: Booking) -> StoreResult<Booking> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(winner) = self.interleaved.lock().unwrap().booking.take() {
            tables.bookings.push(winner);
        }
        if booking.payment_id.is_some() && tables.bookings.iter().any(|b| b.payment_id == booking.payment_id) {
            return Err(StoreError::Conflict("Payment already has a booking".to_string()));
        }
        tables.bookings.push(booking.clone());
        Ok(booking)
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables.lock().unwrap().bookings.iter().find(|b| b.id == id).cloned())
    }

    async fn find_booking_by_payment(&self, payment_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .bookings
            .iter()
            .find(|b| b.payment_id == Some(payment_id))
            .cloned())
    }

    async fn update_booking(&self, booking: Booking) -> StoreResult<Booking> {
        let id = booking.id;
        replace(&mut self.tables.lock().unwrap().bookings, booking, |b| b.id == id)
    }

    async fn list_guest_bookings(&self, guest_id: Uuid) -> StoreResult<Vec<Booking>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .bookings
            .iter()
            .filter(|b| b.guest_id == guest_id)
            .cloned()
            .collect())
    }

    async fn list_host_bookings(&self, host_id: Uuid) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .bookings
            .iter()
            .filter(|b| {
                tables
                    .properties
                    .iter()
                    .any(|p| p.id == b.property_id && p.host_id == host_id)
            })
            .cloned()
            .collect())
    }

    async fn has_overlapping_booking(
        &self,
        property_id: Uuid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> StoreResult<bool> {
        Ok(self.tables.lock().unwrap().bookings.iter().any(|b| {
            b.property_id == property_id
                && b.status == BookingStatus::Confirmed
                && b.check_in < check_out
                && check_in < b.check_out
        }))
    }

    async fn insert_commission(&self, commission: CommissionTransaction) -> StoreResult<CommissionTransaction> {
        self.tables.lock().unwrap().commissions.push(commission.clone());
        Ok(commission)
    }

    async fn find_commission_by_payment(&self, payment_id: Uuid) -> StoreResult<Option<CommissionTransaction>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .commissions
            .iter()
            .find(|c| c.payment_id == payment_id)
            .cloned())
    }

    async fn update_commission(&self, commission: CommissionTransaction) -> StoreResult<CommissionTransaction> {
        let id = commission.id;
        replace(&mut self.tables.lock().unwrap().commissions, commission, |c| c.id == id)
    }

    async fn list_commissions(&self) -> StoreResult<Vec<CommissionTransaction>> {
        Ok(self.commissions())
    }

    async fn get_settings(&self) -> StoreResult<PlatformSettings> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .settings
            .clone()
            .unwrap_or_else(|| PlatformSettings::defaults(Utc::now())))
    }

    async fn save_settings(&self, settings: PlatformSettings) -> StoreResult<PlatformSettings> {
        self.tables.lock().unwrap().settings = Some(settings.clone());
        Ok(settings)
    }

    async fn insert_review(&self, review: Review) -> StoreResult<Review> {
        let mut tables = self.tables.lock().unwrap();
        if tables.reviews.iter().any(|r| r.booking_id == review.booking_id) {
            return Err(StoreError::Conflict("Booking already reviewed".to_string()));
        }
        tables.reviews.push(review.clone());
        Ok(review)
    }

    async fn list_reviews(&self, property_id: Uuid) -> StoreResult<Vec<Review>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .reviews
            .iter()
            .filter(|r| r.property_id == property_id)
            .cloned()
            .collect())
    }

    async fn find_review_by_booking(&self, booking_id: Uuid) -> StoreResult<Option<Review>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .reviews
            .iter()
            .find(|r| r.booking_id == booking_id)
            .cloned())
    }

    async fn find_conversation(&self, property_id: Uuid, guest_id: Uuid) -> StoreResult<Option<Conversation>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .conversations
            .iter()
            .find(|c| c.property_id == property_id && c.guest_id == guest_id)
            .cloned())
    }

    async fn get_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn insert_conversation(&self, conversation: Conversation) -> StoreResult<Conversation> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(winner) = self.interleaved.lock().unwrap().conversation.take() {
            tables.conversations.push(winner);
        }
        if tables
            .conversations
            .iter()
            .any(|c| c.property_id == conversation.property_id && c.guest_id == conversation.guest_id)
        {
            return Err(StoreError::Conflict("Conversation already exists".to_string()));
        }
        tables.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn insert_message(&self, message: Message) -> StoreResult<Message> {
        self.tables.lock().unwrap().messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut tables = self.tables.lock().unwrap();
        let mut changed = 0;
        for message in tables
            .messages
            .iter_mut()
            .filter(|m| m.conversation_id == conversation_id && m.sender_id != reader_id && m.read_at.is_none())
        {
            message.read_at = Some(now);
            changed += 1;
        }
        Ok(changed)
    }

    async fn unread_count(&self, user_id: Uuid) -> StoreResult<i64> {
        let tables = self.tables.lock().unwrap();
        let count = tables
            .messages
            .iter()
            .filter(|m| m.sender_id != user_id && m.read_at.is_none())
            .filter(|m| {
                tables
                    .conversations
                    .iter()
                    .any(|c| c.id == m.conversation_id && c.has_participant(user_id))
            })
            .count();
        Ok(count as i64)
    }
}
