//! Async frame reading and writing.
//!
//! Readers never assume a single `read` returns a whole frame: the fixed
//! header is read first, then exactly the declared number of body bytes.
//! EOF at any point surfaces as [`RpcError::ConnectionClosed`].

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::wire_format::{
    RequestHeader, ResponseHeader, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};
use crate::error::{RpcError, Result};

/// Read the 5-byte request header.
pub async fn read_request_header<R>(reader: &mut R) -> Result<RequestHeader>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; REQUEST_HEADER_SIZE];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(RpcError::from_read)?;
    RequestHeader::decode(&buf)
        .ok_or_else(|| RpcError::Protocol("Truncated request header".to_string()))
}

/// Read the body declared by `header` and return the complete frame bytes
/// (header included).
pub async fn read_request_body<R>(reader: &mut R, header: RequestHeader) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(header.frame_len());
    buf.put_slice(&header.encode());
    buf.resize(header.frame_len(), 0);
    reader
        .read_exact(&mut buf[REQUEST_HEADER_SIZE..])
        .await
        .map_err(RpcError::from_read)?;
    Ok(buf.freeze())
}

/// Read one complete request frame, rejecting oversize payloads.
///
/// An oversize frame is reported before its body is read; callers that want
/// to keep the stream in sync use [`skip_bytes`] with the header's body
/// length.
pub async fn read_request_frame<R>(reader: &mut R, max_payload_size: u32) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let header = read_request_header(reader).await?;
    header.validate(max_payload_size)?;
    read_request_body(reader, header).await
}

/// Read one complete response frame (header included).
pub async fn read_response_frame<R>(reader: &mut R, max_payload_size: u32) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; RESPONSE_HEADER_SIZE];
    reader
        .read_exact(&mut head)
        .await
        .map_err(RpcError::from_read)?;
    let header = ResponseHeader::decode(&head)
        .ok_or_else(|| RpcError::Protocol("Truncated response header".to_string()))?;
    header.validate(max_payload_size)?;

    let mut buf = BytesMut::with_capacity(header.frame_len());
    buf.put_slice(&head);
    buf.resize(header.frame_len(), 0);
    reader
        .read_exact(&mut buf[RESPONSE_HEADER_SIZE..])
        .await
        .map_err(RpcError::from_read)?;
    Ok(buf.freeze())
}

/// Discard exactly `len` bytes from the reader.
pub async fn skip_bytes<R>(reader: &mut R, len: u64) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let copied = tokio::io::copy(&mut reader.take(len), &mut tokio::io::sink()).await?;
    if copied < len {
        return Err(RpcError::ConnectionClosed);
    }
    Ok(())
}

/// Write a complete encoded frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}
