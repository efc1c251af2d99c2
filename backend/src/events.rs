//! In-process publish/subscribe for realtime UI updates.
//!
//! Delivery is best effort: slow subscribers that fall behind the channel
//! capacity skip the missed events and simply see the next one.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use serde::Serialize;
use std::convert::Infallible;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::AppState;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketplaceEvent {
    #[serde(rename_all = "camelCase")]
    UnreadCountChanged { user_id: Uuid, count: i64 },
    #[serde(rename_all = "camelCase")]
    BookingStatusChanged {
        user_id: Uuid,
        booking_id: Uuid,
        status: crate::models::BookingStatus,
    },
}

impl MarketplaceEvent {
    pub fn recipient(&self) -> Uuid {
        match self {
            MarketplaceEvent::UnreadCountChanged { user_id, .. } => *user_id,
            MarketplaceEvent::BookingStatusChanged { user_id, .. } => *user_id,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            MarketplaceEvent::UnreadCountChanged { .. } => "unread_count",
            MarketplaceEvent::BookingStatusChanged { .. } => "booking_status",
        }
    }
}

#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<MarketplaceEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: MarketplaceEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketplaceEvent> {
        self.sender.subscribe()
    }

    /// Events addressed to `user_id`, lagged messages dropped.
    pub fn stream_for(&self, user_id: Uuid) -> impl Stream<Item = MarketplaceEvent> {
        BroadcastStream::new(self.subscribe())
            .filter_map(move |received| received.ok().filter(|event| event.recipient() == user_id))
    }
}

pub async fn events_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    log::info!("Opening event stream for {}", user.id);
    let stream = state.events.stream_for(user.id).map(|event| {
        let sse = Event::default().event(event.name());
        Ok(sse.json_data(&event).unwrap_or_else(|_| Event::default().comment("unserializable event")))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
