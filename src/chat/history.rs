use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    accounts::{parse_user_id, Account, ContactView, Directory},
    auth::Identity,
    error::ApiError,
    AppResult, AppState,
};

use super::store::{Message, MessageStore};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageView {
    pub id: i64,
    pub sender: ContactView,
    pub receiver: ContactView,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub is_read: bool,
}

impl MessageView {
    fn new(message: Message, me: &Account, peer: &Account) -> MessageView {
        let (sender, receiver) = if message.sender_id == me.id {
            (me, peer)
        } else {
            (peer, me)
        };
        MessageView {
            id: message.id,
            sender: sender.into(),
            receiver: receiver.into(),
            message: message.text,
            timestamp: message.created_at,
            is_read: message.is_read,
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct PostMessage {
    #[serde(default)]
    message: Option<String>,
}

async fn peer_account(directory: &Directory, peer: &str) -> AppResult<Account> {
    let not_found = || ApiError::NotFound(format!("user {peer}"));
    let id = parse_user_id(peer).ok_or_else(not_found)?;

    Ok(directory.lookup(id).await?.ok_or_else(not_found)?)
}

#[debug_handler(state = AppState)]
pub(crate) async fn history(
    Path(peer): Path<String>,
    Identity(me): Identity,
    State(directory): State<Directory>,
    State(store): State<MessageStore>,
) -> AppResult<Json<Vec<MessageView>>> {
    let peer = peer_account(&directory, &peer).await?;
    let messages = store.list_between(me.id, peer.id).await?;

    Ok(Json(
        messages
            .into_iter()
            .map(|m| MessageView::new(m, &me, &peer))
            .collect(),
    ))
}

/// Stores a message outside the live channel. Nothing is pushed to an open
/// room; clients pick it up from history.
#[debug_handler(state = AppState)]
pub(crate) async fn post_message(
    Path(peer): Path<String>,
    Identity(me): Identity,
    State(directory): State<Directory>,
    State(store): State<MessageStore>,
    Json(PostMessage { message }): Json<PostMessage>,
) -> AppResult<(StatusCode, Json<MessageView>)> {
    let peer = peer_account(&directory, &peer).await?;
    let Some(message) = message.filter(|m| !m.is_empty()) else {
        return Err(ApiError::BadRequest("Message is required".into()))?;
    };

    let saved = store.create(me.id, peer.id, &message).await?;
    tracing::info!(id = saved.id, sender_id = me.id, receiver_id = peer.id, "message posted");
    Ok((StatusCode::CREATED, Json(MessageView::new(saved, &me, &peer))))
}
