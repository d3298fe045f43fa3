//! TCP transport helpers.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use carrier_rpc::transport::{bind, dial};
//!
//! # async fn run() -> carrier_rpc::error::Result<()> {
//! let listener = bind("127.0.0.1:0").await?;
//! let addr = listener.local_addr()?;
//! let stream = dial(addr, Duration::from_secs(5)).await?;
//! # drop(stream);
//! # Ok(())
//! # }
//! ```

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpListener, TcpStream, ToSocketAddrs};

use crate::error::{RpcError, Result};

/// Resolve `addr` to its first socket address.
///
/// # Errors
///
/// `Transport` if the lookup fails or yields no addresses.
pub async fn resolve(addr: impl ToSocketAddrs) -> Result<SocketAddr> {
    lookup_host(addr).await?.next().ok_or_else(|| {
        RpcError::Transport(io::Error::new(
            io::ErrorKind::NotFound,
            "address resolved to nothing",
        ))
    })
}

/// Dial `addr`, giving up after `timeout`.
///
/// # Errors
///
/// `Transport` on connection failure or timeout.
pub async fn dial(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            RpcError::Transport(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {} timed out after {:?}", addr, timeout),
            ))
        })??;
    configure_stream(&stream)?;
    Ok(stream)
}

/// Bind a listener on `addr`.
pub async fn bind(addr: impl ToSocketAddrs) -> Result<TcpListener> {
    Ok(TcpListener::bind(addr).await?)
}

/// Apply socket options shared by both ends.
pub fn configure_stream(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;
    Ok(())
}

/// True for I/O errors that mean the peer is gone and the connection is
/// unusable.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_and_dial() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (accepted, dialed) = tokio::join!(listener.accept(), dial(addr, Duration::from_secs(5)));
        let (_server_side, peer) = accepted.unwrap();
        let stream = dialed.unwrap();

        assert!(stream.nodelay().unwrap());
        assert_eq!(peer, stream.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = dial(addr, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let addr = resolve("127.0.0.1:8080").await.unwrap();
        assert_eq!(addr.port(), 8080);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_is_disconnect() {
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::UnexpectedEof)));
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(!is_disconnect(&io::Error::from(io::ErrorKind::InvalidData)));
        assert!(!is_disconnect(&io::Error::from(io::ErrorKind::WouldBlock)));
    }
}
