use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::events::{EventHub, MarketplaceEvent};
use crate::models::{Conversation, Message, Property};
use crate::store::{MarketplaceStore, StoreError};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversationRequest {
    pub property_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: i64,
}

/// Recomputes the unread badge of `user_id` and pushes it to their open streams.
async fn notify_unread(store: &dyn MarketplaceStore, events: &EventHub, user_id: Uuid) {
    match store.unread_count(user_id).await {
        Ok(count) => events.publish(MarketplaceEvent::UnreadCountChanged { user_id, count }),
        Err(e) => log::warn!("Unread count for {} not refreshed: {}", user_id, e),
    }
}

async fn participant_conversation(
    store: &dyn MarketplaceStore,
    user: AuthUser,
    conversation_id: Uuid,
) -> Result<Conversation, AppError> {
    let conversation = store
        .get_conversation(conversation_id)
        .await?
        .ok_or(AppError::NotFound("Conversation"))?;
    if !conversation.has_participant(user.id) {
        return Err(AppError::Forbidden("You are not part of this conversation".to_string()));
    }
    Ok(conversation)
}

/// Returns the guest's thread on `property`, creating it on first contact.
async fn open_conversation(
    store: &dyn MarketplaceStore,
    property: &Property,
    guest_id: Uuid,
) -> Result<Conversation, AppError> {
    if let Some(existing) = store.find_conversation(property.id, guest_id).await? {
        return Ok(existing);
    }
    let created = store
        .insert_conversation(Conversation {
            id: Uuid::new_v4(),
            property_id: property.id,
            guest_id,
            host_id: property.host_id,
            created_at: Utc::now(),
        })
        .await;
    match created {
        Ok(conversation) => {
            log::info!("Opened conversation {} on property {}", conversation.id, property.id);
            Ok(conversation)
        }
        // Another request opened the same thread first.
        Err(StoreError::Conflict(_)) => store
            .find_conversation(property.id, guest_id)
            .await?
            .ok_or(AppError::NotFound("Conversation")),
        Err(e) => Err(e.into()),
    }
}

/// Gets or creates the guest's thread with the host of a property.
pub async fn start_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<StartConversationRequest>,
) -> Result<Json<Conversation>, AppError> {
    let property = state
        .store
        .get_property(request.property_id)
        .await?
        .ok_or(AppError::NotFound("Property"))?;
    if property.host_id == user.id {
        return Err(AppError::Validation("You cannot message yourself about your own listing".to_string()));
    }

    let conversation = open_conversation(state.store.as_ref(), &property, user.id).await?;
    Ok(Json(conversation))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let conversation = participant_conversation(state.store.as_ref(), user, conversation_id).await?;
    let body = request.body.trim();
    if body.is_empty() {
        return Err(AppError::Validation("Message cannot be empty".to_string()));
    }

    let message = state
        .store
        .insert_message(Message {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            sender_id: user.id,
            body: body.to_string(),
            read_at: None,
            created_at: Utc::now(),
        })
        .await?;

    notify_unread(state.store.as_ref(), &state.events, conversation.other_participant(user.id)).await;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Lists the thread and marks the other party's messages as read.
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, AppError> {
    let conversation = participant_conversation(state.store.as_ref(), user, conversation_id).await?;
    let marked = state.store.mark_read(conversation.id, user.id, Utc::now()).await?;
    if marked > 0 {
        notify_unread(state.store.as_ref(), &state.events, user.id).await;
    }
    let messages = state.store.list_messages(conversation.id).await?;
    Ok(Json(messages))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UnreadCount>, AppError> {
    let count = state.store.unread_count(user.id).await?;
    Ok(Json(UnreadCount { count }))
}
