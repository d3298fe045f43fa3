//! RPC client over a fixed pool of TCP connections.
//!
//! Each call takes one connection exclusively for a single
//! request/response exchange:
//! 1. Encode the request frame
//! 2. Acquire a pooled connection (bounded by the call token)
//! 3. Write the frame, read the response frame
//! 4. Return the connection to the pool (or discard it if broken)
//! 5. Decode the response
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use carrier_rpc::{CallToken, Client};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize)]
//! struct TestConnReq {
//!     message: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct TestConnRsp {
//!     client_ip: String,
//!     client_message: String,
//! }
//!
//! # async fn run() -> carrier_rpc::error::Result<()> {
//! let client = Client::connect("127.0.0.1:3000", 4).await?;
//!
//! let token = CallToken::with_timeout(Duration::from_secs(5));
//! let req = TestConnReq { message: "Hello, server. Message 0".to_string() };
//! let rsp: TestConnRsp = client.invoke(&token, "TestConn", &req).await?;
//! println!("{} said {}", rsp.client_ip, rsp.client_message);
//! # Ok(())
//! # }
//! ```

mod pool;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::ToSocketAddrs;

use crate::codec::{PayloadFormat, WireCodec};
use crate::error::Result;
use crate::method::Method;
use crate::protocol::{read_response_frame, write_frame, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::token::CallToken;
use crate::transport;

pub use pool::{ConnectionPool, PooledConnection};

/// Default number of pooled connections.
pub const DEFAULT_CONNECTIONS: usize = 4;

/// Default bound on a single write or read when the call token has no
/// deadline.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on dialing one connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Number of pooled connections (must be at least 1).
    pub connections: usize,
    /// Write/read bound used when the call token has no deadline.
    pub io_timeout: Duration,
    /// Bound on dialing one connection.
    pub connect_timeout: Duration,
    /// Payload format; must match the server's.
    pub format: PayloadFormat,
    /// Largest response body accepted.
    pub max_payload_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connections: DEFAULT_CONNECTIONS,
            io_timeout: DEFAULT_IO_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            format: PayloadFormat::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

/// Builder for configuring and connecting a [`Client`].
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a new client builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of pooled connections.
    ///
    /// Default: 4
    pub fn connections(mut self, n: usize) -> Self {
        self.config.connections = n;
        self
    }

    /// Set the write/read bound used when a call token has no deadline.
    ///
    /// Default: 10 seconds
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.config.io_timeout = timeout;
        self
    }

    /// Set the dial timeout.
    ///
    /// Default: 5 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the payload format.
    ///
    /// Default: JSON
    pub fn format(mut self, format: PayloadFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Set the largest response body accepted.
    ///
    /// Default: 16 MiB
    pub fn max_payload_size(mut self, max: u32) -> Self {
        self.config.max_payload_size = max;
        self
    }

    /// Resolve `addr` and dial the pool.
    pub async fn connect(self, addr: impl ToSocketAddrs) -> Result<Client> {
        Client::with_config(addr, self.config).await
    }
}

struct ClientInner {
    pool: ConnectionPool,
    codec: WireCodec,
    config: ClientConfig,
}

/// A connected RPC client.
///
/// Cheap to clone; clones share the pool. Safe to use from many tasks at
/// once: at most `connections` calls are in flight, the rest wait.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Dial `connections` connections to `addr` with default settings.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `connections` is zero, `Transport` if resolving or
    /// any dial fails. A partially dialed pool is closed.
    pub async fn connect(addr: impl ToSocketAddrs, connections: usize) -> Result<Self> {
        Self::builder().connections(connections).connect(addr).await
    }

    /// Dial a pool using `config`.
    pub async fn with_config(addr: impl ToSocketAddrs, config: ClientConfig) -> Result<Self> {
        let addr = transport::resolve(addr).await?;
        let pool = ConnectionPool::connect(addr, config.connections, config.connect_timeout).await?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                pool,
                codec: WireCodec::new(config.format),
                config,
            }),
        })
    }

    /// Call `method` with `request` and decode the response as `Resp`.
    ///
    /// The request is encoded before a connection is taken, so encode
    /// failures never touch the pool. Acquire is bounded by `token`; the
    /// write and the read are each bounded by the token's deadline or, if
    /// it has none, the configured I/O timeout.
    ///
    /// # Errors
    ///
    /// - Serialization or `Protocol` errors from encoding the request
    /// - `Cancelled` / `DeadlineExceeded` while waiting or during I/O
    /// - `Transport` / `ConnectionClosed` on I/O failure (the connection is
    ///   discarded and replaced on a later call)
    /// - `Business` when the handler reported an error
    /// - Serialization errors decoding the response
    pub async fn invoke<Req, Resp>(&self, token: &CallToken, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let inner = &*self.inner;

        // 1. Encode
        let frame = inner.codec.encode_request(method, request)?;

        // 2. Acquire
        let mut conn = inner.pool.acquire(token).await?;
        let io_timeout = inner.config.io_timeout;

        // 3. Write
        let written = token.run_or(io_timeout, write_frame(conn.stream(), &frame)).await;
        if let Err(e) = written.and_then(|r| r) {
            tracing::warn!(
                "Failed to send {} on connection {}: {}",
                method,
                conn.id(),
                e
            );
            conn.discard();
            return Err(e);
        }

        // 4. Read
        let max = inner.config.max_payload_size;
        let read = token
            .run_or(io_timeout, read_response_frame(conn.stream(), max))
            .await;
        let response = match read.and_then(|r| r) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    "Failed to receive {} response on connection {}: {}",
                    method,
                    conn.id(),
                    e
                );
                conn.discard();
                return Err(e);
            }
        };

        // 5. Release, then decode
        conn.release();
        inner.codec.decode_response::<Resp>(&response)?.into_result()
    }

    /// Call a typed method.
    pub async fn call<M: Method>(&self, token: &CallToken, request: &M::Request) -> Result<M::Response> {
        self.invoke(token, M::NAME, request).await
    }

    /// Maximum number of concurrent calls.
    pub fn capacity(&self) -> usize {
        self.inner.pool.capacity()
    }

    /// Connections sitting idle in the pool.
    pub fn idle_connections(&self) -> usize {
        self.inner.pool.idle_count()
    }

    /// Calls that could start right now without waiting.
    pub fn available_connections(&self) -> usize {
        self.inner.pool.available()
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("addr", &self.inner.pool.addr())
            .field("capacity", &self.inner.pool.capacity())
            .field("format", &self.inner.codec.format())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WrappedError;
    use crate::error::RpcError;
    use crate::protocol::{read_request_frame, RequestFrame};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    /// A hand-rolled server: answers every request with `reply(method)`.
    async fn fake_server<F>(reply: F) -> std::net::SocketAddr
    where
        F: Fn(&str) -> Vec<u8> + Send + Sync + Clone + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let reply = reply.clone();
                tokio::spawn(async move {
                    while let Ok(frame) =
                        read_request_frame(&mut stream, DEFAULT_MAX_PAYLOAD_SIZE).await
                    {
                        let req = RequestFrame::decode(&frame).unwrap();
                        let bytes = reply(&req.method);
                        if bytes.is_empty() {
                            // Hang up without answering.
                            return;
                        }
                        stream.write_all(&bytes).await.unwrap();
                    }
                });
            }
        });
        addr
    }

    fn ok_reply(value: &str) -> Vec<u8> {
        WireCodec::default()
            .encode_response(&value.to_string(), &WrappedError::none())
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::new();
        assert_eq!(builder.config.connections, DEFAULT_CONNECTIONS);
        assert_eq!(builder.config.io_timeout, DEFAULT_IO_TIMEOUT);
        assert_eq!(builder.config.format, PayloadFormat::Json);
    }

    #[tokio::test]
    async fn test_invoke_round_trip() {
        let addr = fake_server(|method| ok_reply(&format!("hello from {}", method))).await;
        let client = Client::connect(addr, 2).await.unwrap();

        let rsp: String = client
            .invoke(&CallToken::background(), "Greet", &())
            .await
            .unwrap();

        assert_eq!(rsp, "hello from Greet");
        assert_eq!(client.idle_connections(), 2);
        assert_eq!(client.capacity(), 2);
    }

    #[tokio::test]
    async fn test_business_error_keeps_connection() {
        let addr = fake_server(|_| {
            WireCodec::default()
                .encode_response(&(), &WrappedError::new("boom"))
                .unwrap()
                .to_vec()
        })
        .await;
        let client = Client::connect(addr, 1).await.unwrap();

        let err = client
            .invoke::<_, String>(&CallToken::background(), "Fail", &())
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Business(ref e) if e.msg == "boom"));
        assert_eq!(client.idle_connections(), 1);
    }

    #[tokio::test]
    async fn test_decode_failure_keeps_connection() {
        let addr = fake_server(|_| ok_reply("not a number")).await;
        let client = Client::connect(addr, 1).await.unwrap();

        let err = client
            .invoke::<_, u64>(&CallToken::background(), "Num", &())
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Json(_)));
        assert_eq!(client.idle_connections(), 1);
    }

    #[tokio::test]
    async fn test_encode_failure_does_not_touch_pool() {
        let addr = fake_server(|_| ok_reply("unused")).await;
        let client = Client::connect(addr, 1).await.unwrap();
        let long_method = "m".repeat(300);

        let err = client
            .invoke::<_, String>(&CallToken::background(), &long_method, &())
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Protocol(_)));
        assert_eq!(client.idle_connections(), 1);
        assert_eq!(client.available_connections(), 1);
    }

    #[tokio::test]
    async fn test_hangup_discards_then_redials() {
        let addr = fake_server(|method| {
            if method == "Hangup" {
                Vec::new()
            } else {
                ok_reply("fine")
            }
        })
        .await;
        let client = Client::connect(addr, 1).await.unwrap();

        let err = client
            .invoke::<_, String>(&CallToken::background(), "Hangup", &())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transport);
        assert_eq!(client.idle_connections(), 0);
        assert_eq!(client.available_connections(), 1);

        let rsp: String = client
            .invoke(&CallToken::background(), "Ping", &())
            .await
            .unwrap();
        assert_eq!(rsp, "fine");
        assert_eq!(client.idle_connections(), 1);
    }

    #[tokio::test]
    async fn test_read_deadline_discards_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and never answer.
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client = Client::connect(addr, 1).await.unwrap();
        let token = CallToken::with_timeout(Duration::from_millis(100));
        let err = client
            .invoke::<_, String>(&token, "Slow", &())
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::DeadlineExceeded));
        assert_eq!(client.idle_connections(), 0);
        assert_eq!(client.available_connections(), 1);
    }

    #[tokio::test]
    async fn test_zero_connections_rejected() {
        let addr = fake_server(|_| ok_reply("unused")).await;
        let err = Client::connect(addr, 0).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidConfig(_)));
    }
}
