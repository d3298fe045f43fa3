//! Request and response frames.
//!
//! Frames are the unit of data on the wire. Encoding produces one contiguous
//! buffer; decoding validates that the buffer holds exactly one frame and
//! slices the segments out of it without copying.
//!
//! # Example
//!
//! ```
//! use carrier_rpc::protocol::RequestFrame;
//! use bytes::Bytes;
//!
//! let frame = RequestFrame::new("TestConn", Bytes::from_static(b"{}"));
//! let bytes = frame.encode().unwrap();
//! assert_eq!(bytes.len(), 1 + 4 + 8 + 2);
//!
//! let decoded = RequestFrame::decode(&bytes).unwrap();
//! assert_eq!(decoded.method, "TestConn");
//! assert_eq!(&decoded.payload[..], b"{}");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{
    RequestHeader, ResponseHeader, MAX_METHOD_LEN, MIN_REQUEST_SIZE, REQUEST_HEADER_SIZE,
    RESPONSE_HEADER_SIZE,
};
use crate::error::{RpcError, Result};

/// A request frame: method name plus serialized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Method name (at most 255 bytes).
    pub method: String,
    /// Serialized request payload.
    pub payload: Bytes,
}

impl RequestFrame {
    /// Create a new request frame.
    pub fn new(method: impl Into<String>, payload: Bytes) -> Self {
        Self {
            method: method.into(),
            payload,
        }
    }

    /// Header describing this frame.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if the method name or payload does not fit its
    /// length prefix.
    pub fn header(&self) -> Result<RequestHeader> {
        let method_len = u8::try_from(self.method.len()).map_err(|_| {
            RpcError::Protocol(format!(
                "Method name length {} exceeds maximum {}",
                self.method.len(),
                MAX_METHOD_LEN
            ))
        })?;
        Ok(RequestHeader::new(method_len, payload_len(&self.payload)?))
    }

    /// Encode into a single contiguous buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let header = self.header()?;
        let mut buf = BytesMut::with_capacity(header.frame_len());
        buf.put_slice(&header.encode());
        buf.put_slice(self.method.as_bytes());
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Decode a complete request frame.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if the buffer is shorter than 6 bytes, its length
    /// does not match the declared lengths, or the method is not UTF-8.
    pub fn decode(buf: &Bytes) -> Result<Self> {
        if buf.len() < MIN_REQUEST_SIZE {
            return Err(RpcError::Protocol(format!(
                "Request frame must be at least {} bytes, got {}",
                MIN_REQUEST_SIZE,
                buf.len()
            )));
        }
        let header = RequestHeader::decode(buf)
            .ok_or_else(|| RpcError::Protocol("Truncated request header".to_string()))?;

        if buf.len() != header.frame_len() {
            return Err(RpcError::Protocol(format!(
                "Request frame length {} does not match declared length {}",
                buf.len(),
                header.frame_len()
            )));
        }

        let method_end = REQUEST_HEADER_SIZE + header.method_len as usize;
        let method = std::str::from_utf8(&buf[REQUEST_HEADER_SIZE..method_end])
            .map_err(|_| RpcError::Protocol("Method name is not valid UTF-8".to_string()))?
            .to_string();

        Ok(Self {
            method,
            payload: buf.slice(method_end..),
        })
    }
}

/// A response frame: serialized payload plus serialized error object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Serialized response payload.
    pub payload: Bytes,
    /// Serialized wrapped error (always present).
    pub error: Bytes,
}

impl ResponseFrame {
    /// Create a new response frame.
    pub fn new(payload: Bytes, error: Bytes) -> Self {
        Self { payload, error }
    }

    /// Header describing this frame.
    pub fn header(&self) -> Result<ResponseHeader> {
        Ok(ResponseHeader::new(
            payload_len(&self.payload)?,
            payload_len(&self.error)?,
        ))
    }

    /// Encode into a single contiguous buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let header = self.header()?;
        let mut buf = BytesMut::with_capacity(header.frame_len());
        buf.put_slice(&header.encode());
        buf.put_slice(&self.payload);
        buf.put_slice(&self.error);
        Ok(buf.freeze())
    }

    /// Decode a complete response frame.
    pub fn decode(buf: &Bytes) -> Result<Self> {
        let header = ResponseHeader::decode(buf).ok_or_else(|| {
            RpcError::Protocol(format!(
                "Response frame must be at least {} bytes, got {}",
                RESPONSE_HEADER_SIZE,
                buf.len()
            ))
        })?;

        if buf.len() != header.frame_len() {
            return Err(RpcError::Protocol(format!(
                "Response frame length {} does not match declared length {}",
                buf.len(),
                header.frame_len()
            )));
        }

        let payload_end = RESPONSE_HEADER_SIZE + header.payload_length as usize;
        Ok(Self {
            payload: buf.slice(RESPONSE_HEADER_SIZE..payload_end),
            error: buf.slice(payload_end..),
        })
    }
}

fn payload_len(data: &[u8]) -> Result<u32> {
    u32::try_from(data.len())
        .map_err(|_| RpcError::Protocol(format!("Segment of {} bytes is too large", data.len())))
}
