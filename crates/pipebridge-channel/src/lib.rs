//! Filesystem-addressable IPC channel handles.
//!
//! A channel is a local byte-stream endpoint named by a filesystem path:
//! a Unix domain socket, a FIFO, or a Windows named pipe. [`ChannelHandle`]
//! opens such a path for read/write and hands out duplicated descriptors for
//! concurrent use.
//!
//! This is the lowest layer of pipebridge. The relay builds on top of the
//! [`ChannelHandle`] type provided here.

pub mod error;
pub mod handle;

pub use error::{ChannelError, Result};
pub use handle::{ChannelHandle, READ_POLL_INTERVAL};
