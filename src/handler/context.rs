//! Call context handed to server-side handlers.
//!
//! # Example
//!
//! ```ignore
//! async fn test_conn(req: TestConnReq, ctx: CallContext) -> HandlerResult<TestConnRsp> {
//!     let ip = ctx.peer_addr().map(|a| a.ip().to_string()).unwrap_or_default();
//!     Ok(TestConnRsp { client_ip: ip, client_message: req.message })
//! }
//! ```

use std::net::SocketAddr;

use crate::token::CallToken;

/// Context passed to request handlers.
///
/// Carries the method being served, the caller's address and a call token.
/// Workers hand every handler a background token: it has no deadline and
/// is never cancelled by the server.
#[derive(Debug, Clone)]
pub struct CallContext {
    method: String,
    peer_addr: Option<SocketAddr>,
    token: CallToken,
}

impl CallContext {
    /// Create a context with a background token and no peer address.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            peer_addr: None,
            token: CallToken::background(),
        }
    }

    /// Attach the caller's address.
    pub fn with_peer_addr(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }

    /// Replace the call token.
    pub fn with_token(mut self, token: CallToken) -> Self {
        self.token = token;
        self
    }

    /// Name of the method being served.
    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Address of the connection the request arrived on.
    #[inline]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// The call token.
    #[inline]
    pub fn token(&self) -> &CallToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_defaults() {
        let ctx = CallContext::new("TestConn");
        assert_eq!(ctx.method(), "TestConn");
        assert!(ctx.peer_addr().is_none());
        assert!(ctx.token().deadline().is_none());
        assert!(!ctx.token().is_cancelled());
    }

    #[test]
    fn test_context_with_peer_addr() {
        let addr: SocketAddr = "127.0.0.1:4242".parse().unwrap();
        let ctx = CallContext::new("TestConn").with_peer_addr(addr);
        assert_eq!(ctx.peer_addr(), Some(addr));

        let clone = ctx.clone();
        assert_eq!(clone.method(), ctx.method());
    }

    #[tokio::test]
    async fn test_context_with_token() {
        let token = CallToken::background();
        let ctx = CallContext::new("Slow").with_token(token.child());
        assert!(!ctx.token().is_cancelled());

        token.cancel();
        assert!(ctx.token().is_cancelled());
        assert!(ctx.token().run(async { 1 }).await.is_err());
    }
}
