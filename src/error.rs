use thiserror::Error;

use crate::chat::RoomKey;

/// Connect-time refusal. Fatal to the connection attempt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("anonymous connection refused")]
    Anonymous,

    #[error("malformed peer id {0:?}")]
    MalformedPeer(String),

    #[error("cannot open a chat with yourself")]
    SelfPeer,

    #[error("peer {0} does not exist")]
    UnknownPeer(i64),

    #[error("account directory unavailable")]
    DirectoryUnavailable,
}

/// Malformed inbound frame. The frame is dropped, the connection stays open.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid json: {0}")]
    Json(#[source] serde_json::Error),

    #[error("frame is not a json object")]
    NotAnObject,

    #[error("invalid fields for {tag}: {source}")]
    InvalidFields {
        tag: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("binary frames are not supported")]
    Binary,
}

/// Persistence failure. Surfaced to the sender only.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored timestamp {0} is out of range")]
    Timestamp(i64),

    #[error("cannot render timestamp: {0}")]
    Format(#[from] time::error::Format),
}

/// Registry invariant violation. Fatal to the offending connection only.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {conn} is already registered in {room}")]
    AlreadyJoined { conn: uuid::Uuid, room: RoomKey },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive integer within its limit, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Errors with a client-facing status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),
}
