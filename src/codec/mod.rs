//! Codec module - payload serialization and the wire codec.
//!
//! - [`JsonCodec`] - textual, field-tagged JSON (default payload format)
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`)
//! - [`WireCodec`] - request/response frame encoding on top of a
//!   [`PayloadFormat`]
//!
//! # Design
//!
//! Payload codecs are marker structs with static methods. The wire codec
//! picks one at runtime through [`PayloadFormat`]; both ends of a connection
//! must agree on the format.
//!
//! # Example
//!
//! ```
//! use carrier_rpc::codec::{PayloadFormat, WireCodec, WrappedError};
//!
//! let codec = WireCodec::new(PayloadFormat::Json);
//! let frame = codec.encode_response(&"pong", &WrappedError::none()).unwrap();
//! let parts = codec.decode_response::<String>(&frame).unwrap();
//! assert_eq!(parts.into_result().unwrap(), "pong");
//! ```

mod json;
mod msgpack;
mod wire;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use wire::{ResponseParts, WireCodec};

/// Serialization format used for payloads and error objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    /// JSON (textual, field-tagged).
    #[default]
    Json,
    /// MessagePack with named fields.
    MsgPack,
}

impl PayloadFormat {
    /// Encode a value in this format.
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            Self::Json => JsonCodec::encode(value),
            Self::MsgPack => MsgPackCodec::encode(value),
        }
    }

    /// Decode a value in this format.
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            Self::Json => JsonCodec::decode(bytes),
            Self::MsgPack => MsgPackCodec::decode(bytes),
        }
    }
}

/// Type-erased serializable payload.
///
/// Lets the server encode handler responses whose concrete type is only
/// known to the registry entry that produced them.
pub trait EncodePayload: Send {
    /// Encode this value in the given format.
    fn encode_payload(&self, format: PayloadFormat) -> Result<Vec<u8>>;
}

impl<T: Serialize + Send> EncodePayload for T {
    fn encode_payload(&self, format: PayloadFormat) -> Result<Vec<u8>> {
        format.encode(self)
    }
}

/// Protocol-level envelope for a business failure.
///
/// Always present in a response frame. An empty `msg` means "no error".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedError {
    /// Error message; empty means success.
    #[serde(default)]
    pub msg: String,
}

impl WrappedError {
    /// Create an error with the given message.
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }

    /// The "no error" value (empty message).
    pub fn none() -> Self {
        Self::default()
    }

    /// True when this carries no error.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.msg.is_empty()
    }

    /// Convert to `None` when empty.
    pub fn into_option(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Display for WrappedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}

impl std::error::Error for WrappedError {}

impl From<&str> for WrappedError {
    fn from(msg: &str) -> Self {
        Self::new(msg)
    }
}

impl From<String> for WrappedError {
    fn from(msg: String) -> Self {
        Self::new(msg)
    }
}
