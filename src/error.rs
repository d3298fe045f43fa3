//! Error types for carrier-rpc.

use thiserror::Error;

use crate::codec::WrappedError;

/// Main error type for all RPC operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error while dialing, reading, writing or closing a connection.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Peer closed the connection (EOF), possibly in the middle of a frame.
    #[error("connection closed")]
    ConnectionClosed,

    /// Malformed frame, short buffer, oversize frame, etc.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Method name not present in the method registry.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// JSON payload serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// The call token was cancelled before the operation completed.
    #[error("call cancelled")]
    Cancelled,

    /// The call token's deadline passed before the operation completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The handler reported a failure. Displays as the bare message.
    #[error("{0}")]
    Business(WrappedError),

    /// Invalid client or server configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification of an [`RpcError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Dial/read/write/close failures, including EOF.
    Transport,
    /// Malformed frames and unknown methods.
    Protocol,
    /// Payload could not be encoded or decoded.
    Serialization,
    /// Cancelled or deadline exceeded.
    Cancelled,
    /// Handler-level failure carried in the response.
    Business,
    /// Bad configuration.
    Config,
}

impl RpcError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::ConnectionClosed => ErrorKind::Transport,
            Self::Protocol(_) | Self::UnknownMethod(_) => ErrorKind::Protocol,
            Self::Json(_) | Self::MsgPackEncode(_) | Self::MsgPackDecode(_) => {
                ErrorKind::Serialization
            }
            Self::Cancelled | Self::DeadlineExceeded => ErrorKind::Cancelled,
            Self::Business(_) => ErrorKind::Business,
            Self::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// The business error carried by the response, if this is one.
    pub fn business(&self) -> Option<&WrappedError> {
        match self {
            Self::Business(e) => Some(e),
            _ => None,
        }
    }

    /// True if this error means the connection it came from is gone.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::Transport(e) => crate::transport::is_disconnect(e),
            _ => false,
        }
    }

    /// Map a read error to `ConnectionClosed` when it is an EOF.
    pub(crate) fn from_read(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::ConnectionClosed
        } else {
            Self::Transport(err)
        }
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_error_displays_bare_message() {
        let err = RpcError::Business(WrappedError::new("boom"));
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.kind(), ErrorKind::Business);
        assert_eq!(err.business().map(|e| e.msg.as_str()), Some("boom"));
    }

    #[test]
    fn test_kind_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert_eq!(RpcError::from(io).kind(), ErrorKind::Transport);
        assert_eq!(RpcError::ConnectionClosed.kind(), ErrorKind::Transport);
        assert_eq!(
            RpcError::UnknownMethod("x".into()).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(RpcError::DeadlineExceeded.kind(), ErrorKind::Cancelled);
        assert_eq!(RpcError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_is_disconnect() {
        assert!(RpcError::ConnectionClosed.is_disconnect());
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(RpcError::from(reset).is_disconnect());
        assert!(!RpcError::Protocol("bad".into()).is_disconnect());
    }

    #[test]
    fn test_from_read_maps_eof() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(RpcError::from_read(eof), RpcError::ConnectionClosed));

        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(RpcError::from_read(reset), RpcError::Transport(_)));
    }
}
