//! Loopback TCP relay onto a filesystem-addressable IPC channel.
//!
//! The relay lets a TCP-only client reach a service whose only endpoint is
//! a local IPC channel (a Unix domain socket, FIFO, or Windows named pipe).
//! [`PipeProxy::start`] opens the channel, binds an ephemeral port on
//! `127.0.0.1`, and pumps raw bytes in both directions between every
//! accepted connection and the channel. No framing, no protocol awareness.
//!
//! ```no_run
//! use pipebridge_relay::PipeProxy;
//!
//! # fn main() -> pipebridge_relay::Result<()> {
//! let proxy = PipeProxy::start("/var/run/docker.sock")?;
//! println!("dial tcp://{} instead", proxy.local_addr());
//! // ... hand the address to a TCP-only client ...
//! proxy.stop();
//! # Ok(())
//! # }
//! ```
//!
//! All connections share the one channel handle opened at start; admission
//! is serialized newest-wins, which suits the intended low-concurrency use
//! (one API client at a time). See [`PipeProxy`] for lifecycle details.

pub mod error;
mod hook;
pub mod proxy;
pub mod pump;
mod session;

pub use error::{RelayError, Result};
pub use proxy::PipeProxy;
