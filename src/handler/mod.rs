//! Handler module - server-side request handling and dispatch.
//!
//! Provides:
//! - [`MethodRegistry`] - maps method names to typed handlers
//! - [`CallContext`] - what a handler knows about the call it serves
//!
//! # Example
//!
//! ```ignore
//! use carrier_rpc::handler::{CallContext, MethodRegistry};
//!
//! let mut registry = MethodRegistry::new();
//!
//! registry.register("TestConn", |req: TestConnReq, ctx: CallContext| async move {
//!     let client_ip = ctx.peer_addr().map(|a| a.ip().to_string()).unwrap_or_default();
//!     Ok(TestConnRsp { client_ip, client_message: req.message })
//! })?;
//! ```

mod context;
mod registry;

pub use context::CallContext;
pub use registry::{
    BoxFuture, BoxedRequest, DecodedRequest, Handler, HandlerReply, HandlerResult,
    MethodRegistry, TypedHandler,
};
