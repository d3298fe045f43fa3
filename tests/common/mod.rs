//! Shared fixtures for integration tests: a test service and server setup.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use carrier_rpc::handler::CallContext;
use carrier_rpc::{Method, MethodRegistry, Result, Server, ServerBuilder, Service, WrappedError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestConnReq {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestConnRsp {
    pub client_ip: String,
    pub client_message: String,
}

pub struct TestConn;

impl Method for TestConn {
    const NAME: &'static str = "TestConn";
    type Request = TestConnReq;
    type Response = TestConnRsp;
}

/// Handlers used across the integration tests.
///
/// - `TestConn`: echoes the message with the caller's IP
/// - `Echo`: returns its string argument
/// - `Boom`: always fails with `"boom"`
/// - `Slow`: signals `started`, sleeps the given milliseconds
/// - `Track`: sleeps the given milliseconds while recording per-connection
///   concurrency
#[derive(Default)]
pub struct TestService {
    pub started: Notify,
    in_flight: Mutex<HashMap<SocketAddr, usize>>,
    overlapped: AtomicBool,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl TestService {
    /// True if two calls were ever served on the same connection at once.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    /// Most `Track` calls observed running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn track(&self, peer: Option<SocketAddr>, millis: u64) {
        let peer = peer.expect("peer address");
        {
            let mut in_flight = self.in_flight.lock();
            let count = in_flight.entry(peer).or_insert(0);
            *count += 1;
            if *count > 1 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(millis)).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = self.in_flight.lock().get_mut(&peer) {
            *count -= 1;
        }
    }
}

impl Service for TestService {
    fn register(self: Arc<Self>, registry: &mut MethodRegistry) -> Result<()> {
        registry.register_method::<TestConn, _, _>(|req: TestConnReq, ctx: CallContext| async move {
            Ok(TestConnRsp {
                client_ip: ctx.peer_addr().map(|a| a.ip().to_string()).unwrap_or_default(),
                client_message: req.message,
            })
        })?;

        registry.register("Echo", |s: String, _ctx: CallContext| async move { Ok(s) })?;

        registry.register("Boom", |_: (), _ctx: CallContext| async {
            Err::<(), _>(WrappedError::new("boom"))
        })?;

        let this = self.clone();
        registry.register("Slow", move |millis: u64, _ctx: CallContext| {
            let this = this.clone();
            async move {
                this.started.notify_one();
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok(millis)
            }
        })?;

        let this = self;
        registry.register("Track", move |millis: u64, ctx: CallContext| {
            let this = this.clone();
            async move {
                this.track(ctx.peer_addr(), millis).await;
                Ok(())
            }
        })
    }
}

/// A served server on an ephemeral localhost port.
pub struct TestServer {
    pub server: Server,
    pub addr: SocketAddr,
    pub service: Arc<TestService>,
    pub serving: JoinHandle<Result<()>>,
}

/// Register the test service on `builder` and serve it on `127.0.0.1:0`.
pub async fn start_server(builder: ServerBuilder) -> TestServer {
    init_tracing();

    let service = Arc::new(TestService::default());
    let server = builder.service(service.clone()).build().expect("build server");
    let listener = carrier_rpc::transport::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let serving = tokio::spawn({
        let server = server.clone();
        async move { server.serve(listener).await }
    });

    TestServer {
        server,
        addr,
        service,
        serving,
    }
}
