//! Per-connection reader task.
//!
//! A carrier reads complete request frames off one connection and pushes
//! them onto the job queue. It does no decoding beyond the fixed header.
//! Frames rejected at the header are answered here with a business error.

use std::sync::Arc;

use bytes::Bytes;
use tokio::net::tcp::OwnedReadHalf;

use super::connection::Connection;
use super::queue::{Job, JobSender};
use super::shutdown::ShutdownController;
use crate::codec::{WireCodec, WrappedError};
use crate::error::{RpcError, Result};
use crate::protocol::{read_request_body, read_request_header, skip_bytes};

/// What to do after a failed read.
enum ReadOutcome {
    /// Peer is gone; stop.
    Closed,
    /// Skip this frame and keep reading.
    Retry,
}

/// A frame read off the wire.
enum Inbound {
    /// Complete request, ready to queue.
    Request(Bytes),
    /// Request skipped after header validation failed.
    Rejected(RpcError),
}

pub(crate) struct Carrier {
    conn: Arc<Connection>,
    reader: OwnedReadHalf,
    jobs: JobSender,
    codec: WireCodec,
    shutdown: ShutdownController,
    max_payload_size: u32,
}

impl Carrier {
    pub(crate) fn new(
        conn: Arc<Connection>,
        reader: OwnedReadHalf,
        jobs: JobSender,
        codec: WireCodec,
        shutdown: ShutdownController,
        max_payload_size: u32,
    ) -> Self {
        Self {
            conn,
            reader,
            jobs,
            codec,
            shutdown,
            max_payload_size,
        }
    }

    /// Read frames until the peer disconnects or shutdown is requested.
    pub(crate) async fn run(mut self) {
        let id = self.conn.id();
        tracing::debug!("Carrier started for connection {} ({})", id, self.conn.peer_addr());

        loop {
            if self.shutdown.is_stopping() {
                tracing::debug!("Carrier for connection {} stopping", id);
                break;
            }

            let frame = tokio::select! {
                biased;
                _ = self.shutdown.stop_requested() => {
                    tracing::debug!("Carrier for connection {} stopping", id);
                    break;
                }
                frame = read_frame(&mut self.reader, self.max_payload_size) => frame,
            };

            let frame = match frame {
                Ok(Inbound::Request(frame)) => frame,
                Ok(Inbound::Rejected(e)) => {
                    tracing::warn!("Rejected request on connection {}: {}", id, e);
                    self.reject(&e).await;
                    continue;
                }
                Err(e) => match self.classify(&e) {
                    ReadOutcome::Closed => {
                        tracing::debug!("Connection {} closed: {}", id, e);
                        break;
                    }
                    ReadOutcome::Retry => {
                        tracing::warn!("Failed to read request on connection {}: {}", id, e);
                        continue;
                    }
                },
            };

            if self.jobs.push(Job::new(frame, self.conn.clone())).await.is_err() {
                tracing::warn!("Job queue closed, dropping request from connection {}", id);
                break;
            }
        }
    }

    /// Answer a rejected request with a business error.
    async fn reject(&self, err: &RpcError) {
        let error = WrappedError::new(err.to_string());
        let reply = match self.codec.encode_response(&(), &error) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Failed to encode rejection: {}", e);
                return;
            }
        };
        if let Err(e) = self.conn.write_frame(&reply).await {
            tracing::warn!(
                "Failed to write rejection on connection {}: {}",
                self.conn.id(),
                e
            );
        }
    }

    fn classify(&self, err: &RpcError) -> ReadOutcome {
        if err.is_disconnect() {
            ReadOutcome::Closed
        } else {
            ReadOutcome::Retry
        }
    }
}

/// Read one frame. An oversize frame is skipped so the stream stays in
/// sync, then returned as rejected.
async fn read_frame(reader: &mut OwnedReadHalf, max_payload_size: u32) -> Result<Inbound> {
    let header = read_request_header(reader).await?;
    if let Err(e) = header.validate(max_payload_size) {
        skip_bytes(reader, header.body_len() as u64).await?;
        return Ok(Inbound::Rejected(e));
    }
    read_request_body(reader, header).await.map(Inbound::Request)
}
