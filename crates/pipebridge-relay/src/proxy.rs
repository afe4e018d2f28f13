use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use pipebridge_channel::ChannelHandle;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::hook;
use crate::session::{self, SessionSlot};

/// Bridges a filesystem-addressable IPC channel to an ephemeral loopback
/// TCP port.
///
/// `start` opens the channel, binds `127.0.0.1:0`, and launches the accept
/// loop in the background; clients then dial [`local_addr`](Self::local_addr)
/// in place of the channel path. `stop` (also run by [`Drop`] and by the
/// process termination hook) tears everything down best-effort.
pub struct PipeProxy {
    shared: Arc<ProxyShared>,
    hook_id: u64,
}

pub(crate) struct ProxyShared {
    path: PathBuf,
    local_addr: SocketAddr,
    channel: Mutex<Option<ChannelHandle>>,
    listener: Mutex<Option<Arc<TcpListener>>>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
    slot: SessionSlot,
    stopping: AtomicBool,
    next_session_id: AtomicU64,
}

impl PipeProxy {
    /// Open the channel at `path`, bind an ephemeral loopback listener, and
    /// launch the accept loop.
    ///
    /// Returns before any client has connected; the assigned address is
    /// available through [`local_addr`](Self::local_addr). Fails with
    /// [`RelayError::ChannelUnavailable`] or [`RelayError::Bind`]; a failed
    /// start leaves no listener bound.
    pub fn start(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Channel first: a failed open must leave no listener behind.
        let channel = ChannelHandle::open(&path)?;
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(RelayError::Bind)?;
        let local_addr = listener.local_addr().map_err(RelayError::Bind)?;
        let listener = Arc::new(listener);

        let shared = Arc::new(ProxyShared {
            path,
            local_addr,
            channel: Mutex::new(Some(channel)),
            listener: Mutex::new(Some(Arc::clone(&listener))),
            accept_thread: Mutex::new(None),
            slot: SessionSlot::default(),
            stopping: AtomicBool::new(false),
            next_session_id: AtomicU64::new(1),
        });

        let accept_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || accept_loop(&accept_shared, &listener));
        *lock(&shared.accept_thread) = Some(handle);

        let hook_id = hook::register(&shared);
        info!(path = ?shared.path, addr = %local_addr, "accessing IPC channel via TCP relay");

        Ok(Self { shared, hook_id })
    }

    /// The loopback address clients dial in place of the channel path.
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// The channel path this relay was started against.
    pub fn channel_path(&self) -> &Path {
        &self.shared.path
    }

    /// Tear the relay down: cancel the in-flight session, release the
    /// listener, and close the shared channel.
    ///
    /// Safe to call any number of times; teardown failures are logged and
    /// never returned.
    pub fn stop(&self) {
        self.shared.stop();
        hook::deregister(self.hook_id);
    }
}

impl Drop for PipeProxy {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PipeProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeProxy")
            .field("path", &self.shared.path)
            .field("local_addr", &self.shared.local_addr)
            .finish()
    }
}

impl ProxyShared {
    pub(crate) fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(addr = %self.local_addr, "stopping relay");

        // Retire the active session before the shared channel goes away.
        self.slot.cancel_active();

        let listener = lock(&self.listener).take();
        if let Some(listener) = &listener {
            if let Err(source) = unblock_accept(listener, self.local_addr) {
                let err = RelayError::Teardown {
                    resource: "listener",
                    source,
                };
                warn!(error = %err, "teardown");
            }
        }
        if let Some(handle) = lock(&self.accept_thread).take() {
            if handle.join().is_err() {
                warn!("accept loop panicked before stop");
            }
        }
        // Last reference to the listening socket: the port is released here.
        drop(listener);

        if let Some(channel) = lock(&self.channel).take() {
            if let Err(source) = channel.shutdown() {
                let err = RelayError::Teardown {
                    resource: "channel",
                    source,
                };
                warn!(error = %err, "teardown");
            }
        }
    }

    fn clone_channel_pair(&self) -> Option<(ChannelHandle, ChannelHandle)> {
        let guard = lock(&self.channel);
        let channel = guard.as_ref()?;
        let reader = channel
            .try_clone()
            .map_err(|err| warn!(error = %err, "cannot clone channel for session"))
            .ok()?;
        let writer = channel
            .try_clone()
            .map_err(|err| warn!(error = %err, "cannot clone channel for session"))
            .ok()?;
        Some((reader, writer))
    }
}

fn accept_loop(shared: &Arc<ProxyShared>, listener: &TcpListener) {
    debug!(addr = %shared.local_addr, "accept loop running");
    loop {
        let (client, peer_addr) = match listener.accept() {
            Ok(pair) => pair,
            Err(err) => {
                if shared.stopping.load(Ordering::SeqCst) {
                    // Deliberate shutdown of the listener is the stop
                    // signal, not an error.
                    debug!("listener closed, accept loop exiting");
                    return;
                }
                warn!(error = %RelayError::Accept(err), "transient accept failure");
                continue;
            }
        };

        if shared.stopping.load(Ordering::SeqCst) {
            // Wake-up connection from stop, or a client racing teardown.
            let _ = client.shutdown(Shutdown::Both);
            return;
        }

        let id = shared.next_session_id.fetch_add(1, Ordering::Relaxed);
        debug!(session = id, peer = %peer_addr, "accepted connection");

        let Some((chan_reader, chan_writer)) = shared.clone_channel_pair() else {
            let _ = client.shutdown(Shutdown::Both);
            continue;
        };

        // Hand off immediately; the admission wait (if any predecessor is
        // still active) happens on the session thread, never here.
        let session_shared = Arc::clone(shared);
        thread::spawn(move || {
            session::run(
                id,
                client,
                chan_reader,
                chan_writer,
                &session_shared.slot,
                &session_shared.stopping,
            );
        });
    }
}

/// Force a blocking accept on `listener` to return.
///
/// On Unix a shutdown on the listening descriptor wakes the accept call with
/// an error. Platforms where a listening socket cannot be shut down fall
/// back to a throwaway self-connection; the loop then observes the stop flag
/// on the accepted socket.
fn unblock_accept(listener: &TcpListener, addr: SocketAddr) -> std::io::Result<()> {
    shutdown_listener(listener).or_else(|_| TcpStream::connect(addr).map(drop))
}

#[cfg(unix)]
fn shutdown_listener(listener: &TcpListener) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    // SAFETY: the descriptor is an open listening socket owned by
    // `listener`, which outlives this call; shutdown() neither closes nor
    // invalidates it.
    let rc = unsafe { libc::shutdown(listener.as_raw_fd(), libc::SHUT_RDWR) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn shutdown_listener(_listener: &TcpListener) -> std::io::Result<()> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
