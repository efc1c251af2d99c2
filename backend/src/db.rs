use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use crate::models::{
    Booking, BookingStatus, CommissionTransaction, Conversation, Message, Payment, PlatformSettings, Profile,
    Property, Review,
};
use crate::schema::{
    bookings, commission_transactions, conversations, messages, payments, platform_settings, profiles, properties,
    reviews,
};
use crate::store::{MarketplaceStore, PropertyFilter, StoreError, StoreResult};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

pub fn establish_pool(database_url: &str, max_size: u32) -> Result<PgPool, StoreError> {
    log::info!("Connecting to database (pool size {})", max_size);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    match Pool::builder().max_size(max_size).build(manager) {
        Ok(pool) => {
            log::info!("Database connection pool established");
            Ok(pool)
        }
        Err(e) => {
            log::error!("Failed to establish database connection pool: {}", e);
            Err(StoreError::Pool(e))
        }
    }
}

/// Postgres-backed store. Each call checks a connection out of the pool and
/// runs on the blocking thread pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, DieselError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn).map_err(map_write_error)
        })
        .await?
    }

    /// Connectivity probe used at startup.
    pub async fn ping(&self) -> StoreResult<i32> {
        self.run(|conn| diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("1")).get_result(conn))
            .await
    }
}

fn map_write_error(e: DieselError) -> StoreError {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            StoreError::Conflict(info.message().to_string())
        }
        other => StoreError::Query(other),
    }
}

#[async_trait]
impl MarketplaceStore for PgStore {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        self.run(move |conn| profiles::table.find(id).first::<Profile>(conn).optional())
            .await
    }

    async fn list_properties(&self, filter: PropertyFilter) -> StoreResult<Vec<Property>> {
        self.run(move |conn| {
            let mut query = properties::table
                .filter(properties::is_active.eq(true))
                .into_boxed();
            if let Some(category) = filter.category {
                query = query.filter(properties::category.eq(category));
            }
            if let Some(city) = filter.city {
                query = query.filter(properties::city.ilike(city));
            }
            query.order_by(properties::created_at.desc()).load::<Property>(conn)
        })
        .await
    }

    async fn get_property(&self, id: Uuid) -> StoreResult<Option<Property>> {
        self.run(move |conn| properties::table.find(id).first::<Property>(conn).optional())
            .await
    }

    async fn insert_property(&self, property: Property) -> StoreResult<Property> {
        self.run(move |conn| {
            diesel::insert_into(properties::table)
                .values(&property)
                .get_result::<Property>(conn)
        })
        .await
    }

    async fn insert_payment(&self, payment: Payment) -> StoreResult<Payment> {
        self.run(move |conn| {
            diesel::insert_into(payments::table)
                .values(&payment)
                .get_result::<Payment>(conn)
        })
        .await
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        self.run(move |conn| payments::table.find(id).first::<Payment>(conn).optional())
            .await
    }

    async fn find_payment_by_session(&self, session_id: &str) -> StoreResult<Option<Payment>> {
        let session_id = session_id.to_string();
        self.run(move |conn| {
            payments::table
                .filter(payments::provider_session_id.eq(session_id))
                .first::<Payment>(conn)
                .optional()
        })
        .await
    }

    async fn update_payment(&self, payment: Payment) -> StoreResult<Payment> {
        self.run(move |conn| {
            diesel::update(payments::table.find(payment.id))
                .set(&payment)
                .get_result::<Payment>(conn)
        })
        .await
    }

    async fn insert_booking(&self, booking: Booking) -> StoreResult<Booking> {
        self.run(move |conn| {
            diesel::insert_into(bookings::table)
                .values(&booking)
                .get_result::<Booking>(conn)
        })
        .await
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        self.run(move |conn| bookings::table.find(id).first::<Booking>(conn).optional())
            .await
    }

    async fn find_booking_by_payment(&self, payment_id: Uuid) -> StoreResult<Option<Booking>> {
        self.run(move |conn| {
            bookings::table
                .filter(bookings::payment_id.eq(payment_id))
                .first::<Booking>(conn)
                .optional()
        })
        .await
    }

    async fn update_booking(&self, booking: Booking) -> StoreResult<Booking> {
        self.run(move |conn| {
            diesel::update(bookings::table.find(booking.id))
                .set(&booking)
                .get_result::<Booking>(conn)
        })
        .await
    }

    async fn list_guest_bookings(&self, guest_id: Uuid) -> StoreResult<Vec<Booking>> {
        self.run(move |conn| {
            bookings::table
                .filter(bookings::guest_id.eq(guest_id))
                .order_by(bookings::check_in.desc())
                .load::<Booking>(conn)
        })
        .await
    }

    async fn list_host_bookings(&self, host_id: Uuid) -> StoreResult<Vec<Booking>> {
        self.run(move |conn| {
            bookings::table
                .inner_join(properties::table)
                .filter(properties::host_id.eq(host_id))
                .select(bookings::all_columns)
                .order_by(bookings::check_in.desc())
                .load::<Booking>(conn)
        })
        .await
    }

    async fn has_overlapping_booking(
        &self,
        property_id: Uuid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> StoreResult<bool> {
        self.run(move |conn| {
            diesel::select(diesel::dsl::exists(
                bookings::table
                    .filter(bookings::property_id.eq(property_id))
                    .filter(bookings::status.eq(BookingStatus::Confirmed))
                    .filter(bookings::check_in.lt(check_out))
                    .filter(bookings::check_out.gt(check_in)),
            ))
            .get_result::<bool>(conn)
        })
        .await
    }

    async fn insert_commission(&self, commission: CommissionTransaction) -> StoreResult<CommissionTransaction> {
        self.run(move |conn| {
            diesel::insert_into(commission_transactions::table)
                .values(&commission)
                .get_result::<CommissionTransaction>(conn)
        })
        .await
    }

    async fn find_commission_by_payment(&self, payment_id: Uuid) -> StoreResult<Option<CommissionTransaction>> {
        self.run(move |conn| {
            commission_transactions::table
                .filter(commission_transactions::payment_id.eq(payment_id))
                .first::<CommissionTransaction>(conn)
                .optional()
        })
        .await
    }

    async fn update_commission(&self, commission: CommissionTransaction) -> StoreResult<CommissionTransaction> {
        self.run(move |conn| {
            diesel::update(commission_transactions::table.find(commission.id))
                .set(&commission)
                .get_result::<CommissionTransaction>(conn)
        })
        .await
    }

    async fn list_commissions(&self) -> StoreResult<Vec<CommissionTransaction>> {
        self.run(|conn| {
            commission_transactions::table
                .order_by(commission_transactions::created_at.desc())
                .load::<CommissionTransaction>(conn)
        })
        .await
    }

    async fn get_settings(&self) -> StoreResult<PlatformSettings> {
        let stored = self
            .run(|conn| {
                platform_settings::table
                    .find(PlatformSettings::SINGLETON_ID)
                    .first::<PlatformSettings>(conn)
                    .optional()
            })
            .await?;
        Ok(stored.unwrap_or_else(|| PlatformSettings::defaults(Utc::now())))
    }

    async fn save_settings(&self, settings: PlatformSettings) -> StoreResult<PlatformSettings> {
        self.run(move |conn| {
            diesel::insert_into(platform_settings::table)
                .values(&settings)
                .on_conflict(platform_settings::id)
                .do_update()
                .set(&settings)
                .get_result::<PlatformSettings>(conn)
        })
        .await
    }

    async fn insert_review(&self, review: Review) -> StoreResult<Review> {
        self.run(move |conn| {
            diesel::insert_into(reviews::table)
                .values(&review)
                .get_result::<Review>(conn)
        })
        .await
    }

    async fn list_reviews(&self, property_id: Uuid) -> StoreResult<Vec<Review>> {
        self.run(move |conn| {
            reviews::table
                .filter(reviews::property_id.eq(property_id))
                .order_by(reviews::created_at.desc())
                .load::<Review>(conn)
        })
        .await
    }

    async fn find_review_by_booking(&self, booking_id: Uuid) -> StoreResult<Option<Review>> {
        self.run(move |conn| {
            reviews::table
                .filter(reviews::booking_id.eq(booking_id))
                .first::<Review>(conn)
                .optional()
        })
        .await
    }

    async fn find_conversation(&self, property_id: Uuid, guest_id: Uuid) -> StoreResult<Option<Conversation>> {
        self.run(move |conn| {
            conversations::table
                .filter(conversations::property_id.eq(property_id))
                .filter(conversations::guest_id.eq(guest_id))
                .first::<Conversation>(conn)
                .optional()
        })
        .await
    }

    async fn get_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        self.run(move |conn| conversations::table.find(id).first::<Conversation>(conn).optional())
            .await
    }

    async fn insert_conversation(&self, conversation: Conversation) -> StoreResult<Conversation> {
        self.run(move |conn| {
            diesel::insert_into(conversations::table)
                .values(&conversation)
                .get_result::<Conversation>(conn)
        })
        .await
    }

    async fn insert_message(&self, message: Message) -> StoreResult<Message> {
        self.run(move |conn| {
            diesel::insert_into(messages::table)
                .values(&message)
                .get_result::<Message>(conn)
        })
        .await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        self.run(move |conn| {
            messages::table
                .filter(messages::conversation_id.eq(conversation_id))
                .order_by(messages::created_at.asc())
                .load::<Message>(conn)
        })
        .await
    }

    async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid, now: DateTime<Utc>) -> StoreResult<usize> {
        self.run(move |conn| {
            diesel::update(
                messages::table
                    .filter(messages::conversation_id.eq(conversation_id))
                    .filter(messages::sender_id.ne(reader_id))
                    .filter(messages::read_at.is_null()),
            )
            .set(messages::read_at.eq(Some(now)))
            .execute(conn)
        })
        .await
    }

    async fn unread_count(&self, user_id: Uuid) -> StoreResult<i64> {
        self.run(move |conn| {
            messages::table
                .inner_join(conversations::table)
                .filter(
                    conversations::guest_id
                        .eq(user_id)
                        .or(conversations::host_id.eq(user_id)),
                )
                .filter(messages::sender_id.ne(user_id))
                .filter(messages::read_at.is_null())
                .count()
                .get_result::<i64>(conn)
        })
        .await
    }
}
