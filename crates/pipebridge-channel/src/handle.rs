use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{ChannelError, Result};

/// Interval at which an idle socket-channel read wakes up.
///
/// A read that returns `WouldBlock`/`TimedOut` after this interval is a
/// cancellation checkpoint for the caller, not an error; no data is consumed.
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An open read/write handle to a filesystem-addressable IPC channel.
///
/// A channel is named by a filesystem path. A socket path connects as a
/// Unix domain socket stream; any other openable path (a FIFO, a device, a
/// Windows named pipe) is opened through the file API. Either way the handle
/// is a duplex byte stream with no framing of its own.
pub struct ChannelHandle {
    path: PathBuf,
    inner: ChannelInner,
}

enum ChannelInner {
    #[cfg(unix)]
    Socket(std::os::unix::net::UnixStream),
    Pipe(File),
}

impl ChannelHandle {
    /// Open the channel at `path` for read/write.
    ///
    /// Fails with [`ChannelError::Unavailable`] when the path does not exist
    /// or cannot be opened. Socket handles get [`READ_POLL_INTERVAL`] as
    /// their read timeout so idle reads stay interruptible.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;

            let metadata =
                std::fs::symlink_metadata(&path).map_err(|e| ChannelError::Unavailable {
                    path: path.clone(),
                    source: e,
                })?;

            if metadata.file_type().is_socket() {
                let stream = std::os::unix::net::UnixStream::connect(&path).map_err(|e| {
                    ChannelError::Unavailable {
                        path: path.clone(),
                        source: e,
                    }
                })?;
                stream.set_read_timeout(Some(READ_POLL_INTERVAL))?;
                debug!(?path, "connected to socket channel");
                return Ok(Self {
                    path,
                    inner: ChannelInner::Socket(stream),
                });
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| ChannelError::Unavailable {
                path: path.clone(),
                source: e,
            })?;
        debug!(?path, "opened pipe channel");
        Ok(Self {
            path,
            inner: ChannelInner::Pipe(file),
        })
    }

    /// Duplicate the handle (creates a new descriptor onto the same channel).
    ///
    /// Clones share the underlying open channel; dropping a clone never
    /// closes the channel for the other clones.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            #[cfg(unix)]
            ChannelInner::Socket(stream) => ChannelInner::Socket(stream.try_clone()?),
            ChannelInner::Pipe(file) => ChannelInner::Pipe(file.try_clone()?),
        };
        Ok(Self {
            path: self.path.clone(),
            inner,
        })
    }

    /// Shut down both directions of the channel.
    ///
    /// Unblocks readers on every clone of a socket handle. File-backed
    /// handles have no half-close; the call is a no-op for them.
    pub fn shutdown(&self) -> std::io::Result<()> {
        match &self.inner {
            #[cfg(unix)]
            ChannelInner::Socket(stream) => stream.shutdown(std::net::Shutdown::Both),
            ChannelInner::Pipe(_) => {
                debug!(path = ?self.path, "no half-close on file-backed channel");
                Ok(())
            }
        }
    }

    /// The path this channel was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Backend name for diagnostics.
    pub fn backend_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            ChannelInner::Socket(_) => "unix-socket",
            ChannelInner::Pipe(_) => "pipe-file",
        }
    }
}

impl Read for ChannelHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            ChannelInner::Socket(stream) => stream.read(buf),
            ChannelInner::Pipe(file) => file.read(buf),
        }
    }
}

impl Write for ChannelHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            ChannelInner::Socket(stream) => stream.write(buf),
            ChannelInner::Pipe(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            ChannelInner::Socket(stream) => stream.flush(),
            ChannelInner::Pipe(file) => file.flush(),
        }
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("path", &self.path)
            .field("backend", &self.backend_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    fn unique_temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "pipebridge-channel-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[test]
    fn open_missing_path_is_unavailable() {
        let dir = unique_temp_dir("missing");
        let result = ChannelHandle::open(dir.join("no-such-channel"));
        assert!(matches!(result, Err(ChannelError::Unavailable { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn open_socket_path_without_listener_is_unavailable() {
        use std::os::unix::net::UnixListener;

        let dir = unique_temp_dir("refused");
        let sock_path = dir.join("channel.sock");
        // Bind then drop, leaving a stale socket file behind.
        drop(UnixListener::bind(&sock_path).expect("listener should bind"));

        let result = ChannelHandle::open(&sock_path);
        assert!(matches!(result, Err(ChannelError::Unavailable { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn socket_channel_roundtrip() {
        use std::os::unix::net::UnixListener;

        let dir = unique_temp_dir("roundtrip");
        let sock_path = dir.join("channel.sock");
        let listener = UnixListener::bind(&sock_path).expect("listener should bind");

        let mut handle = ChannelHandle::open(&sock_path).expect("channel should open");
        assert_eq!(handle.backend_name(), "unix-socket");

        let (mut upstream, _) = listener.accept().expect("upstream should accept");

        handle.write_all(b"request").expect("channel write should succeed");
        let mut buf = [0u8; 7];
        upstream.read_exact(&mut buf).expect("upstream should read");
        assert_eq!(&buf, b"request");

        upstream.write_all(b"reply").expect("upstream write should succeed");
        let mut buf = [0u8; 5];
        handle.read_exact(&mut buf).expect("channel should read");
        assert_eq!(&buf, b"reply");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn clones_share_the_channel() {
        use std::os::unix::net::UnixListener;

        let dir = unique_temp_dir("clone");
        let sock_path = dir.join("channel.sock");
        let listener = UnixListener::bind(&sock_path).expect("listener should bind");

        let handle = ChannelHandle::open(&sock_path).expect("channel should open");
        let mut writer = handle.try_clone().expect("clone should succeed");
        let (mut upstream, _) = listener.accept().expect("upstream should accept");

        writer.write_all(b"one").expect("clone write should succeed");
        // Dropping a clone must not close the channel for the original.
        drop(writer);
        let mut writer = handle.try_clone().expect("second clone should succeed");
        writer.write_all(b"two").expect("clone write should succeed");

        let mut buf = [0u8; 6];
        upstream.read_exact(&mut buf).expect("upstream should read");
        assert_eq!(&buf, b"onetwo");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn idle_socket_read_times_out_without_consuming() {
        use std::os::unix::net::UnixListener;

        let dir = unique_temp_dir("timeout");
        let sock_path = dir.join("channel.sock");
        let listener = UnixListener::bind(&sock_path).expect("listener should bind");

        let mut handle = ChannelHandle::open(&sock_path).expect("channel should open");
        let _upstream = listener.accept().expect("upstream should accept");

        let mut buf = [0u8; 8];
        let err = handle.read(&mut buf).expect_err("idle read should time out");
        assert!(matches!(
            err.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn shutdown_unblocks_cloned_readers() {
        use std::os::unix::net::UnixListener;

        let dir = unique_temp_dir("shutdown");
        let sock_path = dir.join("channel.sock");
        let listener = UnixListener::bind(&sock_path).expect("listener should bind");

        let handle = ChannelHandle::open(&sock_path).expect("channel should open");
        let mut reader = handle.try_clone().expect("clone should succeed");
        let _upstream = listener.accept().expect("upstream should accept");

        handle.shutdown().expect("shutdown should succeed");

        let mut buf = [0u8; 8];
        let read = reader.read(&mut buf).expect("read after shutdown is EOF");
        assert_eq!(read, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn regular_file_opens_as_pipe_backend() {
        let dir = unique_temp_dir("file");
        let file_path = dir.join("channel.bin");
        std::fs::write(&file_path, b"").expect("file should be writable");

        let handle = ChannelHandle::open(&file_path).expect("file channel should open");
        assert_eq!(handle.backend_name(), "pipe-file");
        assert!(handle.shutdown().is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
