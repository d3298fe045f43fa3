//! # carrier-rpc
//!
//! Minimal request/response RPC over TCP.
//!
//! A [`Client`] keeps a fixed pool of connections and uses each for one
//! exchange at a time. A [`Server`] reads requests with one carrier task
//! per connection, queues them, and runs handlers on a fixed pool of
//! worker tasks.
//!
//! ## Wire format
//!
//! - Request: `[u8 method_len][u32 LE payload_len][method][payload]`
//! - Response: `[u32 LE payload_len][u32 LE error_len][payload][error]`
//!
//! Payloads and the error object (`{"msg": "..."}`) are JSON by default,
//! MessagePack optionally.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use carrier_rpc::handler::CallContext;
//! use carrier_rpc::{CallToken, Client, Server};
//!
//! #[tokio::main]
//! async fn main() -> carrier_rpc::error::Result<()> {
//!     let server = Server::builder()
//!         .handle("Echo", |msg: String, _ctx: CallContext| async move { Ok(msg) })
//!         .build()?;
//!     let listener = carrier_rpc::transport::bind("127.0.0.1:3000").await?;
//!     tokio::spawn({
//!         let server = server.clone();
//!         async move { server.serve(listener).await }
//!     });
//!
//!     let client = Client::connect("127.0.0.1:3000", 4).await?;
//!     let token = CallToken::with_timeout(Duration::from_secs(5));
//!     let reply: String = client.invoke(&token, "Echo", "hello").await?;
//!     assert_eq!(reply, "hello");
//!
//!     server.graceful_shutdown().await
//! }
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod transport;

mod method;
mod token;

pub use client::{Client, ClientBuilder, ClientConfig};
pub use codec::{PayloadFormat, WrappedError};
pub use error::{ErrorKind, Result, RpcError};
pub use handler::{CallContext, HandlerResult, MethodRegistry};
pub use method::{Method, Service};
pub use server::{Server, ServerBuilder, ServerConfig, ServerState};
pub use token::CallToken;
