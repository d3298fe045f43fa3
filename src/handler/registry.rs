//! Method registry for dispatching requests by method name.
//!
//! The registry maps method names to typed handlers. Each entry knows how to
//! decode its own request type, so a request decoded against the registry
//! always carries the handler it will be dispatched to.
//!
//! # Example
//!
//! ```
//! use carrier_rpc::handler::{CallContext, MethodRegistry};
//! use carrier_rpc::WrappedError;
//!
//! let mut registry = MethodRegistry::new();
//!
//! registry
//!     .register("Echo", |msg: String, _ctx: CallContext| async move {
//!         if msg.is_empty() {
//!             return Err(WrappedError::new("empty message"));
//!         }
//!         Ok(msg)
//!     })
//!     .unwrap();
//!
//! assert!(registry.contains("Echo"));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::CallContext;
use crate::codec::{EncodePayload, PayloadFormat, WrappedError};
use crate::error::{RpcError, Result};
use crate::method::{Method, Service};
use crate::protocol::MAX_METHOD_LEN;

/// Result type for handler functions.
pub type HandlerResult<T> = std::result::Result<T, WrappedError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Request value after payload decoding, before dispatch.
pub type BoxedRequest = Box<dyn Any + Send>;

/// What a handler produced: a payload to encode and a (possibly empty) error.
pub struct HandlerReply {
    /// Response value. `()` when the handler failed.
    pub payload: Box<dyn EncodePayload>,
    /// Business error; empty on success.
    pub error: WrappedError,
}

impl HandlerReply {
    /// Successful reply.
    pub fn ok<T: Serialize + Send + 'static>(value: T) -> Self {
        Self {
            payload: Box::new(value),
            error: WrappedError::none(),
        }
    }

    /// Failed reply with a null payload. An empty message becomes
    /// `"handler failed"` so the client still sees an error.
    pub fn err(error: impl Into<WrappedError>) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = WrappedError::new("handler failed");
        }
        Self {
            payload: Box::new(()),
            error,
        }
    }

    /// True if this reply carries a business error.
    pub fn is_err(&self) -> bool {
        !self.error.is_empty()
    }
}

impl fmt::Debug for HandlerReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerReply")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Trait for registered handlers.
pub trait Handler: Send + Sync + 'static {
    /// Decode a payload into this handler's request type.
    fn decode(&self, payload: &[u8], format: PayloadFormat) -> Result<BoxedRequest>;

    /// Run the handler on a request produced by [`decode`](Handler::decode).
    fn call(&self, request: BoxedRequest, ctx: CallContext) -> BoxFuture<'static, HandlerReply>;
}

/// Wrapper that decodes into `Req` and encodes whatever `Resp` it returns.
pub struct TypedHandler<F, Req, Resp, Fut>
where
    F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = HandlerResult<Resp>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(Req) -> (Resp, Fut)>,
}

impl<F, Req, Resp, Fut> TypedHandler<F, Req, Resp, Fut>
where
    F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = HandlerResult<Resp>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Req, Resp, Fut> Handler for TypedHandler<F, Req, Resp, Fut>
where
    F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = HandlerResult<Resp>> + Send + 'static,
{
    fn decode(&self, payload: &[u8], format: PayloadFormat) -> Result<BoxedRequest> {
        let request: Req = format.decode(payload)?;
        Ok(Box::new(request))
    }

    fn call(&self, request: BoxedRequest, ctx: CallContext) -> BoxFuture<'static, HandlerReply> {
        let request = match request.downcast::<Req>() {
            Ok(request) => *request,
            Err(_) => {
                let method = ctx.method().to_string();
                return Box::pin(async move {
                    HandlerReply::err(format!("request type mismatch for method {}", method))
                });
            }
        };

        let fut = (self.handler)(request, ctx);
        Box::pin(async move {
            match fut.await {
                Ok(value) => HandlerReply::ok(value),
                Err(error) => HandlerReply::err(error),
            }
        })
    }
}

/// A request decoded against a registry entry, ready to dispatch.
pub struct DecodedRequest<'r> {
    method: String,
    value: BoxedRequest,
    handler: &'r dyn Handler,
}

impl<'r> DecodedRequest<'r> {
    /// Method name from the frame.
    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The decoded request value, if it is a `T`.
    pub fn value<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Hand the request to its handler.
    pub fn dispatch(self, ctx: CallContext) -> BoxFuture<'static, HandlerReply> {
        self.handler.call(self.value, ctx)
    }
}

impl fmt::Debug for DecodedRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedRequest")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Registry mapping method names to handlers.
///
/// Populated before the server starts and read-only afterwards.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Box<dyn Handler>>,
}

impl MethodRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method handler.
    ///
    /// Registering a name twice replaces the earlier handler.
    ///
    /// # Errors
    ///
    /// `Protocol` if the name is empty or longer than 255 bytes, since it
    /// could never be framed.
    pub fn register<F, Req, Resp, Fut>(&mut self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = HandlerResult<Resp>> + Send + 'static,
    {
        if name.is_empty() || name.len() > MAX_METHOD_LEN {
            return Err(RpcError::Protocol(format!(
                "Method name must be 1..={} bytes, got {}",
                MAX_METHOD_LEN,
                name.len()
            )));
        }

        let typed = TypedHandler::new(handler);
        if self.methods.insert(name.to_string(), Box::new(typed)).is_some() {
            tracing::warn!("Method {} registered twice, replacing handler", name);
        }
        Ok(())
    }

    /// Register a handler for a typed method descriptor.
    pub fn register_method<M, F, Fut>(&mut self, handler: F) -> Result<()>
    where
        M: Method,
        F: Fn(M::Request, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<M::Response>> + Send + 'static,
    {
        self.register(M::NAME, handler)
    }

    /// Let a service register all of its methods.
    pub fn register_service<S: Service>(&mut self, service: Arc<S>) -> Result<()> {
        service.register(self)
    }

    /// Get a handler by method name.
    pub fn get(&self, name: &str) -> Option<&dyn Handler> {
        self.methods.get(name).map(|h| h.as_ref())
    }

    /// Check whether a method is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Decode `payload` into the request type registered under `method`.
    pub(crate) fn decode(
        &self,
        method: String,
        payload: &[u8],
        format: PayloadFormat,
    ) -> Result<DecodedRequest<'_>> {
        let handler = self
            .get(&method)
            .ok_or_else(|| RpcError::UnknownMethod(method.clone()))?;
        let value = handler.decode(payload, format)?;

        Ok(DecodedRequest {
            method,
            value,
            handler,
        })
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.method_names())
            .finish()
    }
}
