//! Protocol module - wire format, framing, and frame I/O.
//!
//! This module implements the binary protocol:
//! - 5-byte request header and 8-byte response header (Little Endian)
//! - Request/response frame encoding and decoding
//! - Exact-length async frame readers

mod frame;
mod io;
mod wire_format;

pub use frame::{RequestFrame, ResponseFrame};
pub use io::{
    read_request_body, read_request_frame, read_request_header, read_response_frame, skip_bytes,
    write_frame,
};
pub use wire_format::{
    RequestHeader, ResponseHeader, DEFAULT_MAX_PAYLOAD_SIZE, MAX_METHOD_LEN, MIN_REQUEST_SIZE,
    REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};
