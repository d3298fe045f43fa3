//! Transport module - TCP dialing, listening and socket setup.
//!
//! Both ends run over plain TCP with Nagle disabled.

mod tcp;

pub use tcp::{bind, configure_stream, dial, is_disconnect, resolve};
