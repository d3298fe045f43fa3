//! Fixed-capacity pool of TCP connections.
//!
//! A semaphore with one permit per connection bounds how many calls can
//! hold a connection at once; idle streams wait in a LIFO list. Holding a
//! permit entitles the holder to one stream: an idle one if available,
//! otherwise a freshly dialed replacement for one that was discarded.
//!
//! A [`PooledConnection`] must end in exactly one of
//! [`release`](PooledConnection::release) (stream is healthy, back to idle)
//! or [`discard`](PooledConnection::discard) (stream is broken, dropped).
//! Dropping the guard without either closes the stream like `discard`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::{RpcError, Result};
use crate::token::CallToken;
use crate::transport;

/// A pooled stream with a stable id for logging.
#[derive(Debug)]
struct PoolStream {
    id: u64,
    stream: TcpStream,
}

/// Pool of up to `capacity` connections to one server address.
#[derive(Debug)]
pub struct ConnectionPool {
    addr: SocketAddr,
    capacity: usize,
    connect_timeout: Duration,
    permits: Semaphore,
    idle: Mutex<Vec<PoolStream>>,
    next_id: AtomicU64,
}

impl ConnectionPool {
    /// Dial `capacity` connections to `addr`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `capacity` is zero, `Transport` if any dial fails.
    /// Connections dialed before the failure are closed.
    pub async fn connect(addr: SocketAddr, capacity: usize, connect_timeout: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(RpcError::InvalidConfig(
                "connection pool needs at least one connection".to_string(),
            ));
        }

        let pool = Self {
            addr,
            capacity,
            connect_timeout,
            permits: Semaphore::new(capacity),
            idle: Mutex::new(Vec::with_capacity(capacity)),
            next_id: AtomicU64::new(0),
        };

        for _ in 0..capacity {
            let conn = pool.dial().await?;
            pool.idle.lock().push(conn);
        }

        tracing::debug!("Connected {} connections to {}", capacity, addr);
        Ok(pool)
    }

    /// Server address this pool dials.
    #[inline]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Maximum number of connections.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Connections currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Connections that could be handed out right now without waiting.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Take a connection, waiting for one to be released if all are busy.
    ///
    /// Waiting ends early when `token` is cancelled or its deadline passes.
    /// If the permit comes without an idle stream (one was discarded), a
    /// replacement is dialed, bounded by the token and the connect timeout.
    ///
    /// # Errors
    ///
    /// `Cancelled`, `DeadlineExceeded`, or `Transport` if redialing fails.
    pub async fn acquire(&self, token: &CallToken) -> Result<PooledConnection<'_>> {
        let permit = token
            .run(self.permits.acquire())
            .await?
            .map_err(|_| RpcError::ConnectionClosed)?;

        let idle = self.idle.lock().pop();
        let conn = match idle {
            Some(conn) => conn,
            None => {
                tracing::debug!("No idle connection to {}, dialing a replacement", self.addr);
                token.run(self.dial()).await??
            }
        };

        Ok(PooledConnection {
            pool: self,
            conn,
            _permit: permit,
        })
    }

    async fn dial(&self) -> Result<PoolStream> {
        let stream = transport::dial(self.addr, self.connect_timeout).await?;
        Ok(PoolStream {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            stream,
        })
    }

    fn put_back(&self, conn: PoolStream) {
        self.idle.lock().push(conn);
    }
}

/// Exclusive use of one pooled connection.
///
/// Fields drop in order: the stream is closed before the permit is
/// returned.
#[derive(Debug)]
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: PoolStream,
    _permit: SemaphorePermit<'a>,
}

impl PooledConnection<'_> {
    /// Pool-assigned connection id.
    pub fn id(&self) -> u64 {
        self.conn.id
    }

    /// The underlying stream.
    pub fn stream(&mut self) -> &mut TcpStream {
        &mut self.conn.stream
    }

    /// Return a healthy connection to the idle list.
    pub fn release(self) {
        let Self { pool, conn, _permit } = self;
        pool.put_back(conn);
    }

    /// Close a broken connection. Its slot stays available; the next
    /// acquire will dial a replacement.
    pub fn discard(self) {
        let Self { pool, conn, _permit } = self;
        tracing::debug!("Discarding connection {} to {}", conn.id, pool.addr);
        drop(conn);
    }
}
