//! Server-side connection handle.

use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, OwnedSemaphorePermit};

use crate::error::Result;
use crate::protocol::write_frame;

/// Write side of an accepted connection, shared by its carrier and every
/// job read from it.
///
/// Responses are written whole under the writer lock, so two workers
/// answering on the same connection never interleave bytes.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    peer_addr: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    _slot: Option<OwnedSemaphorePermit>,
}

impl Connection {
    pub(crate) fn new(
        id: u64,
        peer_addr: SocketAddr,
        writer: OwnedWriteHalf,
        slot: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            id,
            peer_addr,
            writer: Mutex::new(writer),
            _slot: slot,
        }
    }

    /// Server-assigned connection id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Address of the remote end.
    #[inline]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Write one complete encoded frame.
    pub async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, frame).await
    }

    /// Shut down the write side. The peer sees EOF after any frames
    /// already written.
    pub async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        Ok(())
    }
}
