use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    accounts::{AccountType, UserId},
    error::DecodeError,
};

pub type Payload = Map<String, Value>;

const KNOWN_TAGS: &[&str] = &[
    "message",
    "call_initiate",
    "call_offer",
    "call_answer",
    "ice_candidate",
    "call_end",
];

/// Client to server. Identity never travels in the payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Message { message: String },
    CallInitiate,
    CallOffer { offer: Payload },
    CallAnswer { answer: Payload },
    IceCandidate { candidate: Payload },
    CallEnd,
}

impl Inbound {
    pub fn tag(&self) -> &'static str {
        match self {
            Inbound::Message { .. } => "message",
            Inbound::CallInitiate => "call_initiate",
            Inbound::CallOffer { .. } => "call_offer",
            Inbound::CallAnswer { .. } => "call_answer",
            Inbound::IceCandidate { .. } => "ice_candidate",
            Inbound::CallEnd => "call_end",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(Inbound),
    /// A well-formed object whose tag this server does not speak.
    Unknown(String),
}

/// Decodes a text frame. A missing `type` means `message`.
pub fn decode(text: &str) -> Result<Frame, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(DecodeError::Json)?;
    let Value::Object(mut object) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let tag = match object.get("type") {
        None => None,
        Some(Value::String(tag)) => Some(tag.clone()),
        Some(other) => return Ok(Frame::Unknown(other.to_string())),
    };
    let tag = tag.unwrap_or_else(|| {
        object.insert("type".to_owned(), Value::from("message"));
        "message".to_owned()
    });

    if !KNOWN_TAGS.contains(&tag.as_str()) {
        return Ok(Frame::Unknown(tag));
    }

    serde_json::from_value(Value::Object(object))
        .map(Frame::Event)
        .map_err(|source| DecodeError::InvalidFields { tag, source })
}

/// Server to client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Message {
        message: String,
        sender_id: UserId,
        sender_contact: String,
        sender_name: String,
        account_type: AccountType,
        timestamp: String,
    },
    CallInitiate {
        from_id: UserId,
        from_contact: String,
        from_name: String,
    },
    CallOffer {
        offer: Payload,
        from: String,
    },
    CallAnswer {
        answer: Payload,
    },
    IceCandidate {
        candidate: Payload,
    },
    CallEnd,
    /// Sent to the originating connection only.
    Error {
        error: String,
    },
}

impl Outbound {
    pub fn encode(&self) -> Result<Utf8Bytes, serde_json::Error> {
        serde_json::to_string(self).map(Utf8Bytes::from)
    }
}
