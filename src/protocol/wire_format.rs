//! Wire format encoding and decoding.
//!
//! Request header (5 bytes):
//! ```text
//! ┌────────────┬─────────────┐
//! │ Method len │ Payload len │
//! │ 1 byte     │ uint32 LE   │
//! └────────────┴─────────────┘
//! ```
//! followed by the method name and the payload.
//!
//! Response header (8 bytes):
//! ```text
//! ┌─────────────┬─────────────┐
//! │ Payload len │ Error len   │
//! │ uint32 LE   │ uint32 LE   │
//! └─────────────┴─────────────┘
//! ```
//! followed by the payload and the serialized error object.
//!
//! All multi-byte integers are Little Endian.

use crate::error::{RpcError, Result};

/// Request header size in bytes (method length + payload length).
pub const REQUEST_HEADER_SIZE: usize = 5;

/// Response header size in bytes (payload length + error length).
pub const RESPONSE_HEADER_SIZE: usize = 8;

/// Smallest buffer accepted by request decoding.
pub const MIN_REQUEST_SIZE: usize = 6;

/// Longest method name that fits the 1-byte length prefix.
pub const MAX_METHOD_LEN: usize = u8::MAX as usize;

/// Default maximum payload size accepted by frame readers (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Decoded request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Method name length in bytes.
    pub method_len: u8,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl RequestHeader {
    /// Create a new request header.
    pub fn new(method_len: u8, payload_length: u32) -> Self {
        Self {
            method_len,
            payload_length,
        }
    }

    /// Number of bytes following the header.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.method_len as usize + self.payload_length as usize
    }

    /// Total frame length including the header.
    #[inline]
    pub fn frame_len(&self) -> usize {
        REQUEST_HEADER_SIZE + self.body_len()
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use carrier_rpc::protocol::RequestHeader;
    ///
    /// let bytes = RequestHeader::new(8, 0x0102).encode();
    /// assert_eq!(bytes, [8, 0x02, 0x01, 0, 0]);
    /// ```
    pub fn encode(&self) -> [u8; REQUEST_HEADER_SIZE] {
        let mut buf = [0u8; REQUEST_HEADER_SIZE];
        buf[0] = self.method_len;
        buf[1..5].copy_from_slice(&self.payload_length.to_le_bytes());
        buf
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < REQUEST_HEADER_SIZE {
            return None;
        }
        Some(Self {
            method_len: buf[0],
            payload_length: u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]),
        })
    }

    /// Reject payloads larger than `max_payload_size`.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.payload_length > max_payload_size {
            return Err(RpcError::Protocol(format!(
                "Request payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }
        Ok(())
    }
}

/// Decoded response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Payload length in bytes.
    pub payload_length: u32,
    /// Serialized error object length in bytes.
    pub error_length: u32,
}

impl ResponseHeader {
    /// Create a new response header.
    pub fn new(payload_length: u32, error_length: u32) -> Self {
        Self {
            payload_length,
            error_length,
        }
    }

    /// Number of bytes following the header.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.payload_length as usize + self.error_length as usize
    }

    /// Total frame length including the header.
    #[inline]
    pub fn frame_len(&self) -> usize {
        RESPONSE_HEADER_SIZE + self.body_len()
    }

    /// Encode header to bytes (Little Endian).
    pub fn encode(&self) -> [u8; RESPONSE_HEADER_SIZE] {
        let mut buf = [0u8; RESPONSE_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.payload_length.to_le_bytes());
        buf[4..8].copy_from_slice(&self.error_length.to_le_bytes());
        buf
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RESPONSE_HEADER_SIZE {
            return None;
        }
        Some(Self {
            payload_length: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            error_length: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }

    /// Reject bodies larger than `max_payload_size`.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        let total = self.payload_length as u64 + self.error_length as u64;
        if total > max_payload_size as u64 {
            return Err(RpcError::Protocol(format!(
                "Response body size {} exceeds maximum {}",
                total, max_payload_size
            )));
        }
        Ok(())
    }
}
