//! Typed method descriptors.
//!
//! A [`Method`] ties a method name to its request and response types so that
//! both [`Client::call`](crate::Client::call) and
//! [`MethodRegistry::register_method`](crate::handler::MethodRegistry::register_method)
//! agree on them at compile time.
//!
//! # Example
//!
//! ```
//! use carrier_rpc::Method;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! pub struct TestConnReq {
//!     pub message: String,
//! }
//!
//! #[derive(Serialize, Deserialize)]
//! pub struct TestConnRsp {
//!     pub client_ip: String,
//!     pub client_message: String,
//! }
//!
//! pub struct TestConn;
//!
//! impl Method for TestConn {
//!     const NAME: &'static str = "TestConn";
//!     type Request = TestConnReq;
//!     type Response = TestConnRsp;
//! }
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::handler::MethodRegistry;

/// A named method with fixed request and response types.
pub trait Method: Send + Sync + 'static {
    /// Name sent on the wire (at most 255 bytes).
    const NAME: &'static str;
    /// Request payload type.
    type Request: Serialize + DeserializeOwned + Send + 'static;
    /// Response payload type.
    type Response: Serialize + DeserializeOwned + Send + 'static;
}

/// A group of handlers sharing state, registered together.
pub trait Service: Send + Sync + 'static {
    /// Register this service's methods.
    fn register(self: Arc<Self>, registry: &mut MethodRegistry) -> Result<()>;
}
