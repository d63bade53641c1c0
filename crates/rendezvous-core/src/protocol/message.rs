//! Envelope and the six concrete message shapes.

use crate::config::{Endpoint, ProtocolConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminator carried in the `type` field of every message.
///
/// This is the closed table of known tags; anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "register")]
    RegisterRequest,
    #[serde(rename = "registerResponse")]
    RegisterResponse,
    #[serde(rename = "lookup")]
    LookupRequest,
    #[serde(rename = "lookupResponse")]
    LookupResponse,
    #[serde(rename = "request")]
    CallRequest,
    #[serde(rename = "response")]
    CallResponse,
}

impl MessageKind {
    pub const ALL: [MessageKind; 6] = [
        MessageKind::RegisterRequest,
        MessageKind::RegisterResponse,
        MessageKind::LookupRequest,
        MessageKind::LookupResponse,
        MessageKind::CallRequest,
        MessageKind::CallResponse,
    ];

    /// The wire tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::RegisterRequest => "register",
            MessageKind::RegisterResponse => "registerResponse",
            MessageKind::LookupRequest => "lookup",
            MessageKind::LookupResponse => "lookupResponse",
            MessageKind::CallRequest => "request",
            MessageKind::CallResponse => "response",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Opaque correlation id; fresh for every independently constructed message.
    pub trace_id: String,
}

impl Envelope {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            version: ProtocolConfig::VERSION.to_string(),
            kind,
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Outcome flag of a response. All response logic keys off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Anything that can be written as one frame.
pub trait Payload: Serialize {
    fn envelope(&self) -> &Envelope;

    fn kind(&self) -> MessageKind {
        self.envelope().kind
    }

    fn trace_id(&self) -> &str {
        &self.envelope().trace_id
    }
}

/// One of the six concrete message shapes.
pub trait TypedMessage: Payload + DeserializeOwned + Into<Message> {
    const KIND: MessageKind;

    fn envelope_mut(&mut self) -> &mut Envelope;

    /// Copy the correlation id of the request being answered.
    fn in_reply_to(mut self, trace_id: &str) -> Self
    where
        Self: Sized,
    {
        self.envelope_mut().trace_id = trace_id.to_string();
        self
    }
}

/// Announce that `function_name` is served at `host:port`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub function_name: String,
    pub host: String,
    pub port: u16,
}

impl RegisterRequest {
    pub fn new(function_name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            envelope: Envelope::new(MessageKind::RegisterRequest),
            function_name: function_name.into(),
            host: host.into(),
            port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub status: Status,
    #[serde(default)]
    pub message: String,
}

impl RegisterResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self::with_status(Status::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_status(Status::Error, message)
    }

    fn with_status(status: Status, message: impl Into<String>) -> Self {
        Self {
            envelope: Envelope::new(MessageKind::RegisterResponse),
            status,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Ask the registry where `function_name` is served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub function_name: String,
}

impl LookupRequest {
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            envelope: Envelope::new(MessageKind::LookupRequest),
            function_name: function_name.into(),
        }
    }
}

/// `host`/`port` are set only on success, `error_message` only on error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl LookupResponse {
    pub fn success(host: impl Into<String>, port: u16) -> Self {
        Self {
            envelope: Envelope::new(MessageKind::LookupResponse),
            status: Status::Success,
            host: Some(host.into()),
            port: Some(port),
            error_message: None,
        }
    }

    pub fn error(error_message: impl Into<String>) -> Self {
        Self {
            envelope: Envelope::new(MessageKind::LookupResponse),
            status: Status::Error,
            host: None,
            port: None,
            error_message: Some(error_message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// The resolved endpoint, or the registry's error text.
    pub fn endpoint(&self) -> std::result::Result<Endpoint, String> {
        match self.status {
            Status::Success => match (&self.host, self.port) {
                (Some(host), Some(port)) => Ok(Endpoint::new(host.clone(), port)),
                _ => Err("Lookup response is missing host or port".to_string()),
            },
            Status::Error => Err(self
                .error_message
                .clone()
                .unwrap_or_else(|| "Lookup failed".to_string())),
        }
    }
}

/// Invoke `function_name` with positional arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub function_name: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl CallRequest {
    pub fn new(function_name: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            envelope: Envelope::new(MessageKind::CallRequest),
            function_name: function_name.into(),
            arguments,
        }
    }
}

/// `result` is meaningful only on success, `error_message` only on error.
///
/// A null result is omitted from the frame and decodes back to null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CallResponse {
    pub fn success(result: Value) -> Self {
        Self {
            envelope: Envelope::new(MessageKind::CallResponse),
            status: Status::Success,
            result,
            error_message: None,
        }
    }

    pub fn error(error_message: impl Into<String>) -> Self {
        Self {
            envelope: Envelope::new(MessageKind::CallResponse),
            status: Status::Error,
            result: Value::Null,
            error_message: Some(error_message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// The returned value, or the callee's error text.
    pub fn into_result(self) -> std::result::Result<Value, String> {
        match self.status {
            Status::Success => Ok(self.result),
            Status::Error => Err(self
                .error_message
                .unwrap_or_else(|| "Call failed".to_string())),
        }
    }
}

/// Any message, as selected by its discriminator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    RegisterRequest(RegisterRequest),
    RegisterResponse(RegisterResponse),
    LookupRequest(LookupRequest),
    LookupResponse(LookupResponse),
    CallRequest(CallRequest),
    CallResponse(CallResponse),
}

impl Payload for Message {
    fn envelope(&self) -> &Envelope {
        match self {
            Message::RegisterRequest(m) => &m.envelope,
            Message::RegisterResponse(m) => &m.envelope,
            Message::LookupRequest(m) => &m.envelope,
            Message::LookupResponse(m) => &m.envelope,
            Message::CallRequest(m) => &m.envelope,
            Message::CallResponse(m) => &m.envelope,
        }
    }
}

macro_rules! typed_message {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Payload for $ty {
                fn envelope(&self) -> &Envelope {
                    &self.envelope
                }
            }

            impl TypedMessage for $ty {
                const KIND: MessageKind = MessageKind::$ty;

                fn envelope_mut(&mut self) -> &mut Envelope {
                    &mut self.envelope
                }
            }

            impl From<$ty> for Message {
                fn from(message: $ty) -> Self {
                    Message::$ty(message)
                }
            }
        )*
    };
}

typed_message!(
    RegisterRequest,
    RegisterResponse,
    LookupRequest,
    LookupResponse,
    CallRequest,
    CallResponse,
);
