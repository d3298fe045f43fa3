//! Server lifecycle state shared by the listener, carriers and workers.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Lifecycle state of a [`Server`](super::Server).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    /// Accepting connections and serving requests.
    Running = 0,
    /// Shutdown started: no new connections or requests, in-flight work
    /// finishing.
    Draining = 1,
    /// All carriers and workers have exited.
    Stopped = 2,
}

impl ServerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// Shutdown flag and signals.
///
/// `stop` is cancelled when draining begins and wakes everything blocked on
/// accept or on a connection read. `stopped` is cancelled once draining
/// completes.
#[derive(Debug, Clone)]
pub(crate) struct ShutdownController {
    state: Arc<AtomicU8>,
    stop: CancellationToken,
    stopped: CancellationToken,
}

impl ShutdownController {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(ServerState::Running as u8)),
            stop: CancellationToken::new(),
            stopped: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True once shutdown has been requested.
    pub(crate) fn is_stopping(&self) -> bool {
        self.state() != ServerState::Running
    }

    /// Move Running -> Draining and raise the stop signal.
    ///
    /// Returns false if shutdown had already begun.
    pub(crate) fn begin_draining(&self) -> bool {
        let won = self
            .state
            .compare_exchange(
                ServerState::Running as u8,
                ServerState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            self.stop.cancel();
        }
        won
    }

    /// Resolves once shutdown has been requested.
    pub(crate) async fn stop_requested(&self) {
        self.stop.cancelled().await;
    }

    pub(crate) fn mark_stopped(&self) {
        self.state.store(ServerState::Stopped as u8, Ordering::Release);
        self.stopped.cancel();
    }

    /// Resolves once the server has fully stopped.
    pub(crate) async fn wait_stopped(&self) {
        self.stopped.cancelled().await;
    }
}
