//! Bridge filesystem-addressable IPC channels to loopback TCP.
//!
//! pipebridge exposes a service reachable only through a local IPC channel
//! (a Unix domain socket, FIFO, or Windows named pipe) on an ephemeral
//! `127.0.0.1` TCP port, for clients that can only speak TCP.
//!
//! # Crate Structure
//!
//! - [`channel`] — Channel handles: open a filesystem path as a duplex stream
//! - [`relay`] — The relay itself: accept loop, byte pumps, lifecycle control

/// Re-export channel types.
pub mod channel {
    pub use pipebridge_channel::*;
}

/// Re-export relay types.
pub mod relay {
    pub use pipebridge_relay::*;
}
