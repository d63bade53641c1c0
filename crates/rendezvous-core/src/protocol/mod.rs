//! Wire message model.
//!
//! Every frame is one JSON object carrying `version`, `type` and `traceId`
//! plus the fields of its variant:
//!
//! ```text
//! {"version":"1.0","type":"lookup","traceId":"<uuid>","functionName":"toggle"}
//! ```

pub mod codec;
pub mod message;

pub use codec::{decode, decode_as, encode, message_kind, peek, RawHeader};
pub use message::{
    CallRequest, CallResponse, Envelope, LookupRequest, LookupResponse, Message, MessageKind,
    Payload, RegisterRequest, RegisterResponse, Status, TypedMessage,
};
