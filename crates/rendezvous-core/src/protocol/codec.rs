//! Text encoding of messages.
//!
//! Decoding reads only the `type` discriminator first, maps it through the
//! closed [`MessageKind`] table, and only then parses the full body into the
//! matching shape. A tag is never used to pick an arbitrary decode target.

use super::message::{
    CallRequest, CallResponse, LookupRequest, LookupResponse, Message, MessageKind, Payload,
    RegisterRequest, RegisterResponse, TypedMessage,
};
use crate::{RendezvousError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// The envelope fields that can be read from any JSON object, known tag or not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHeader {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
}

/// Encode a message as one line of JSON (no line terminator).
pub fn encode<M: Payload + ?Sized>(message: &M) -> Result<String> {
    serde_json::to_string(message).map_err(|e| RendezvousError::Serialization {
        message: format!("Failed to encode '{}' message", message.kind()),
        source: Some(e),
    })
}

/// Read the discriminator and trace id without interpreting the rest.
pub fn peek(text: &str) -> Result<RawHeader> {
    serde_json::from_str(text).map_err(|e| RendezvousError::Serialization {
        message: "Failed to read message header".to_string(),
        source: Some(e),
    })
}

/// Resolve the discriminator of `text` against the known tag table.
pub fn message_kind(text: &str) -> Result<MessageKind> {
    let tag = peek(text)?.kind.ok_or(RendezvousError::MissingTypeField)?;
    MessageKind::from_tag(&tag).ok_or(RendezvousError::UnknownMessageType(tag))
}

/// Decode any known message.
pub fn decode(text: &str) -> Result<Message> {
    let message = match message_kind(text)? {
        MessageKind::RegisterRequest => parse::<RegisterRequest>(text)?.into(),
        MessageKind::RegisterResponse => parse::<RegisterResponse>(text)?.into(),
        MessageKind::LookupRequest => parse::<LookupRequest>(text)?.into(),
        MessageKind::LookupResponse => parse::<LookupResponse>(text)?.into(),
        MessageKind::CallRequest => parse::<CallRequest>(text)?.into(),
        MessageKind::CallResponse => parse::<CallResponse>(text)?.into(),
    };
    Ok(message)
}

/// Decode a message whose shape the reader already expects.
pub fn decode_as<M: TypedMessage>(text: &str) -> Result<M> {
    let kind = message_kind(text)?;
    if kind != M::KIND {
        return Err(RendezvousError::UnexpectedMessageType {
            expected: M::KIND.to_string(),
            actual: kind.to_string(),
        });
    }
    parse(text)
}

fn parse<M: DeserializeOwned>(text: &str) -> Result<M> {
    serde_json::from_str(text).map_err(|e| RendezvousError::Serialization {
        message: "Failed to decode message".to_string(),
        source: Some(e),
    })
}
