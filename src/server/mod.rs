//! RPC server: carriers read, workers handle.
//!
//! The server runs one carrier task per accepted connection and a fixed
//! pool of worker tasks. Carriers only frame bytes: they read complete
//! request frames and push them onto a bounded job queue. Workers pop jobs,
//! decode them against the [`MethodRegistry`], run the handler and write
//! the response back on the job's connection.
//!
//! Shutdown ([`Server::graceful_shutdown`]):
//! 1. Raise the stop flag and wake the listener and all carriers
//! 2. Wait for every carrier to exit
//! 3. Close the job queue
//! 4. Wait for workers to drain the backlog and exit
//! 5. Mark the server stopped
//!
//! # Example
//!
//! ```no_run
//! use carrier_rpc::handler::CallContext;
//! use carrier_rpc::Server;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct TestConnReq {
//!     message: String,
//! }
//!
//! #[derive(Serialize)]
//! struct TestConnRsp {
//!     client_ip: String,
//!     client_message: String,
//! }
//!
//! # async fn run() -> carrier_rpc::error::Result<()> {
//! let server = Server::builder()
//!     .workers(8)
//!     .handle("TestConn", |req: TestConnReq, ctx: CallContext| async move {
//!         Ok(TestConnRsp {
//!             client_ip: ctx.peer_addr().map(|a| a.ip().to_string()).unwrap_or_default(),
//!             client_message: req.message,
//!         })
//!     })
//!     .build()?;
//!
//! let listener = carrier_rpc::transport::bind("0.0.0.0:3000").await?;
//! let serving = tokio::spawn({
//!     let server = server.clone();
//!     async move { server.serve(listener).await }
//! });
//!
//! tokio::signal::ctrl_c().await?;
//! server.graceful_shutdown().await?;
//! serving.await.ok();
//! # Ok(())
//! # }
//! ```

mod carrier;
mod connection;
mod queue;
mod shutdown;
mod worker;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::codec::{PayloadFormat, WireCodec};
use crate::error::{RpcError, Result};
use crate::handler::{CallContext, HandlerResult, MethodRegistry};
use crate::method::{Method, Service};
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::transport;

use carrier::Carrier;
use connection::Connection;
use queue::JobQueue;
use shutdown::ShutdownController;
use worker::Worker;

pub use queue::DEFAULT_QUEUE_CAPACITY;
pub use shutdown::ServerState;

/// Worker count used when the configured one is out of range.
pub const DEFAULT_WORKERS: usize = 5;

/// Largest accepted worker count.
pub const MAX_WORKERS: usize = 40;

/// Default limit on simultaneously open connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Number of worker tasks. Values outside `1..=40` fall back to 5.
    pub workers: usize,
    /// Job queue capacity.
    pub queue_capacity: usize,
    /// Connections beyond this are accepted and immediately closed.
    pub max_connections: usize,
    /// Payload format; must match the clients'.
    pub format: PayloadFormat,
    /// Largest request body accepted. Larger frames are skipped.
    pub max_payload_size: u32,
    /// Bound on how long [`Server::graceful_shutdown`] waits. `None` waits
    /// for every in-flight handler.
    pub drain_timeout: Option<Duration>,
}

impl ServerConfig {
    /// The worker count actually used.
    pub fn effective_workers(&self) -> usize {
        if (1..=MAX_WORKERS).contains(&self.workers) {
            self.workers
        } else {
            DEFAULT_WORKERS
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            format: PayloadFormat::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            drain_timeout: None,
        }
    }
}

/// Builder for configuring a [`Server`] and registering its handlers.
pub struct ServerBuilder {
    registry: MethodRegistry,
    config: ServerConfig,
    error: Option<RpcError>,
}

impl ServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            registry: MethodRegistry::new(),
            config: ServerConfig::default(),
            error: None,
        }
    }

    /// Register a method handler.
    ///
    /// A registration error is reported by [`build`](Self::build).
    pub fn handle<F, Req, Resp, Fut>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = HandlerResult<Resp>> + Send + 'static,
    {
        let result = self.registry.register(method, handler);
        self.keep_first_error(result);
        self
    }

    /// Register a handler for a typed method descriptor.
    pub fn method<M, F, Fut>(mut self, handler: F) -> Self
    where
        M: Method,
        F: Fn(M::Request, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<M::Response>> + Send + 'static,
    {
        let result = self.registry.register_method::<M, F, Fut>(handler);
        self.keep_first_error(result);
        self
    }

    /// Register all methods of a service.
    pub fn service<S: Service>(mut self, service: Arc<S>) -> Self {
        let result = self.registry.register_service(service);
        self.keep_first_error(result);
        self
    }

    /// Set the number of workers.
    ///
    /// Default: 5. Values outside `1..=40` fall back to the default.
    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    /// Set the job queue capacity.
    ///
    /// Default: 1024
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the open connection limit.
    ///
    /// Default: 1024
    pub fn max_connections(mut self, n: usize) -> Self {
        self.config.max_connections = n;
        self
    }

    /// Set the payload format.
    ///
    /// Default: JSON
    pub fn format(mut self, format: PayloadFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Set the largest request body accepted.
    ///
    /// Default: 16 MiB
    pub fn max_payload_size(mut self, max: u32) -> Self {
        self.config.max_payload_size = max;
        self
    }

    /// Bound how long graceful shutdown waits for in-flight work.
    ///
    /// Default: unbounded
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = Some(timeout);
        self
    }

    /// Build the server and start its workers.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// The first handler registration error, or `InvalidConfig` for a zero
    /// connection limit.
    pub fn build(self) -> Result<Server> {
        if let Some(e) = self.error {
            return Err(e);
        }
        Server::new(self.registry, self.config)
    }

    fn keep_first_error(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ServerInner {
    config: ServerConfig,
    queue: JobQueue,
    shutdown: ShutdownController,
    carriers: TaskTracker,
    workers: TaskTracker,
    connection_slots: Arc<Semaphore>,
    next_connection_id: AtomicU64,
}

/// A running RPC server.
///
/// Cheap to clone; clones control the same server.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Create a server for `registry` and start its workers.
    ///
    /// Must be called from within a Tokio runtime. Call
    /// [`serve`](Self::serve) to start accepting connections.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `max_connections` is zero.
    pub fn new(registry: MethodRegistry, config: ServerConfig) -> Result<Self> {
        if config.max_connections == 0 {
            return Err(RpcError::InvalidConfig(
                "max_connections must be at least 1".to_string(),
            ));
        }

        let workers = config.effective_workers();
        if workers != config.workers {
            tracing::warn!(
                "Worker count {} out of range 1..={}, using {}",
                config.workers,
                MAX_WORKERS,
                workers
            );
        }

        let registry = Arc::new(registry);
        let codec = WireCodec::new(config.format);
        let queue = JobQueue::new(config.queue_capacity);
        let shutdown = ShutdownController::new();

        let worker_tracker = TaskTracker::new();
        for index in 0..workers {
            let worker = Worker::new(
                index,
                queue.receiver(),
                registry.clone(),
                codec,
                shutdown.clone(),
            );
            worker_tracker.spawn(worker.run());
        }
        worker_tracker.close();

        tracing::debug!(
            "Server started {} workers, queue capacity {}, methods {:?}",
            workers,
            queue.capacity(),
            registry.method_names()
        );

        Ok(Self {
            inner: Arc::new(ServerInner {
                connection_slots: Arc::new(Semaphore::new(config.max_connections)),
                config,
                queue,
                shutdown,
                carriers: TaskTracker::new(),
                workers: worker_tracker,
                next_connection_id: AtomicU64::new(0),
            }),
        })
    }

    /// Bind `addr` and serve on it until shutdown.
    pub async fn bind_and_serve(&self, addr: impl tokio::net::ToSocketAddrs) -> Result<()> {
        let listener = transport::bind(addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until shutdown, spawning one carrier
    /// per connection. The listener is closed when this returns.
    ///
    /// Accept errors are logged and retried.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let inner = &*self.inner;
        if let Ok(addr) = listener.local_addr() {
            tracing::debug!("Serving on {}", addr);
        }

        loop {
            if inner.shutdown.is_stopping() {
                break;
            }

            let accepted = tokio::select! {
                biased;
                _ = inner.shutdown.stop_requested() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let Ok(slot) = inner.connection_slots.clone().try_acquire_owned() else {
                tracing::warn!(
                    "Connection limit {} reached, rejecting {}",
                    inner.config.max_connections,
                    peer_addr
                );
                continue;
            };

            let Some(jobs) = inner.queue.sender() else {
                break;
            };

            if let Err(e) = transport::configure_stream(&stream) {
                tracing::debug!("Failed to configure connection from {}: {}", peer_addr, e);
            }

            let id = inner.next_connection_id.fetch_add(1, Ordering::Relaxed);
            let (reader, writer) = stream.into_split();
            let conn = Arc::new(Connection::new(id, peer_addr, writer, Some(slot)));
            let carrier = Carrier::new(
                conn,
                reader,
                jobs,
                WireCodec::new(inner.config.format),
                inner.shutdown.clone(),
                inner.config.max_payload_size,
            );
            inner.carriers.spawn(carrier.run());
        }

        drop(listener);
        tracing::debug!("Listener closed");
        Ok(())
    }

    /// Stop accepting, let carriers and workers finish, and wait until the
    /// server has stopped.
    ///
    /// Safe to call more than once and from several tasks: later calls wait
    /// for the same completion.
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` if a drain timeout is configured and in-flight
    /// work outlasts it. Draining continues in the background.
    pub async fn graceful_shutdown(&self) -> Result<()> {
        if self.inner.shutdown.begin_draining() {
            tracing::info!("Graceful shutdown started");
            tokio::spawn(drain(self.inner.clone()));
        }

        let stopped = self.inner.shutdown.wait_stopped();
        match self.inner.config.drain_timeout {
            Some(timeout) => tokio::time::timeout(timeout, stopped)
                .await
                .map_err(|_| RpcError::DeadlineExceeded),
            None => {
                stopped.await;
                Ok(())
            }
        }
    }

    /// Resolves once the server has fully stopped.
    pub async fn wait_stopped(&self) {
        self.inner.shutdown.wait_stopped().await;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        self.inner.shutdown.state()
    }

    /// Jobs waiting for a worker.
    pub fn queued_jobs(&self) -> usize {
        self.inner.queue.len()
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state())
            .field("queue_closed", &self.inner.queue.is_closed())
            .field("queued_jobs", &self.queued_jobs())
            .finish_non_exhaustive()
    }
}

async fn drain(inner: Arc<ServerInner>) {
    inner.carriers.close();
    inner.carriers.wait().await;
    tracing::debug!("All carriers exited");

    inner.queue.close();
    inner.workers.wait().await;
    tracing::debug!("All workers exited");

    inner.shutdown.mark_stopped();
    tracing::info!("Server stopped");
}
