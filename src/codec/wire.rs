//! Wire codec: payload serialization plus request/response framing.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{EncodePayload, PayloadFormat, WrappedError};
use crate::error::{RpcError, Result};
use crate::handler::{DecodedRequest, MethodRegistry};
use crate::protocol::{RequestFrame, ResponseFrame};

/// Encodes and decodes complete request/response frames.
///
/// Request decoding needs the [`MethodRegistry`] to know which type to
/// decode the payload into; everything else only needs the payload format.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec {
    format: PayloadFormat,
}

impl WireCodec {
    /// Create a codec for the given payload format.
    pub fn new(format: PayloadFormat) -> Self {
        Self { format }
    }

    /// Payload format used by this codec.
    #[inline]
    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Encode a request frame.
    ///
    /// # Errors
    ///
    /// Serialization error if `value` cannot be encoded, `Protocol` if the
    /// method name exceeds 255 bytes.
    pub fn encode_request<T: Serialize + ?Sized>(&self, method: &str, value: &T) -> Result<Bytes> {
        let payload = self.format.encode(value)?;
        RequestFrame::new(method, Bytes::from(payload)).encode()
    }

    /// Decode a request frame into its method and a typed request value.
    ///
    /// # Errors
    ///
    /// `Protocol` for short or inconsistent buffers, `UnknownMethod` if the
    /// method is not registered, serialization error if the payload does not
    /// match the method's request type.
    pub fn decode_request<'r>(
        &self,
        frame: &Bytes,
        registry: &'r MethodRegistry,
    ) -> Result<DecodedRequest<'r>> {
        let RequestFrame { method, payload } = RequestFrame::decode(frame)?;
        registry.decode(method, &payload, self.format)
    }

    /// Encode a response frame carrying `value` and `error`.
    ///
    /// Pass [`WrappedError::none()`] for a successful response.
    pub fn encode_response(&self, value: &dyn EncodePayload, error: &WrappedError) -> Result<Bytes> {
        let payload = value.encode_payload(self.format)?;
        let error = self.format.encode(error)?;
        ResponseFrame::new(Bytes::from(payload), Bytes::from(error)).encode()
    }

    /// Decode a response frame.
    ///
    /// The error segment is decoded first. When it carries a message the
    /// payload is best effort: anything that does not decode as `T` is
    /// dropped and the business error is kept. Without an error the payload
    /// must decode as `T`.
    pub fn decode_response<T: DeserializeOwned>(&self, frame: &Bytes) -> Result<ResponseParts<T>> {
        let ResponseFrame { payload, error } = ResponseFrame::decode(frame)?;
        let error: WrappedError = self.format.decode(&error)?;

        match error.into_option() {
            Some(error) => Ok(ResponseParts {
                value: self.format.decode::<Option<T>>(&payload).ok().flatten(),
                error: Some(error),
            }),
            None => Ok(ResponseParts {
                value: Some(self.format.decode::<T>(&payload)?),
                error: None,
            }),
        }
    }
}

/// Decoded response: the value (if any) and the business error (if any).
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseParts<T> {
    /// Response value. Always `Some` when `error` is `None`.
    pub value: Option<T>,
    /// Business error; `None` when the wrapped error message was empty.
    pub error: Option<WrappedError>,
}

impl<T> ResponseParts<T> {
    /// Collapse into a call result: a business error wins over the value.
    pub fn into_result(self) -> Result<T> {
        match (self.error, self.value) {
            (Some(error), _) => Err(RpcError::Business(error)),
            (None, Some(value)) => Ok(value),
            (None, None) => Err(RpcError::Protocol(
                "Response carries neither a value nor an error".to_string(),
            )),
        }
    }
}
