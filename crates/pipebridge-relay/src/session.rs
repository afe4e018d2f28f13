use std::io::ErrorKind;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use pipebridge_channel::ChannelHandle;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::pump;

/// How long a preempting connection or stop() waits for a cancelled
/// session's pumps to retire.
pub(crate) const RETIRE_GRACE: Duration = Duration::from_secs(2);

/// Admission slot for the single active session.
///
/// The relay multiplexes every TCP connection onto one shared channel
/// handle, so at most one session's pumps may run at a time. Admission is
/// newest-wins: a freshly accepted connection cancels whatever session is
/// active (a stale keep-alive connection cannot wedge the relay) and waits
/// for it to retire before pumping.
#[derive(Default)]
pub(crate) struct SessionSlot {
    active: Mutex<Option<ActiveSession>>,
}

struct ActiveSession {
    id: u64,
    cancel: Arc<AtomicBool>,
    client: TcpStream,
    retirement: Arc<Retirement>,
}

impl SessionSlot {
    fn lock(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(
        &self,
        id: u64,
        client: &TcpStream,
        cancel: &Arc<AtomicBool>,
        retirement: &Arc<Retirement>,
        stopping: &AtomicBool,
    ) -> bool {
        let mut active = self.lock();
        if stopping.load(Ordering::SeqCst) {
            return false;
        }
        if let Some(prev) = active.take() {
            debug!(preempted = prev.id, successor = id, "preempting active session");
            prev.cancel_and_wait();
        }
        let client = match client.try_clone() {
            Ok(stream) => stream,
            Err(err) => {
                warn!(session = id, error = %err, "cannot register session socket");
                return false;
            }
        };
        *active = Some(ActiveSession {
            id,
            cancel: Arc::clone(cancel),
            client,
            retirement: Arc::clone(retirement),
        });
        true
    }

    fn retire(&self, id: u64) {
        let mut active = self.lock();
        if matches!(active.as_ref(), Some(session) if session.id == id) {
            *active = None;
        }
    }

    /// Cancel whatever session is active and wait for it to retire.
    pub(crate) fn cancel_active(&self) {
        let prev = self.lock().take();
        if let Some(prev) = prev {
            prev.cancel_and_wait();
        }
    }
}

impl ActiveSession {
    fn cancel_and_wait(self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Err(err) = self.client.shutdown(Shutdown::Both) {
            debug!(session = self.id, error = %err, "session socket already closed");
        }
        if !self.retirement.wait(RETIRE_GRACE) {
            warn!(session = self.id, "session did not retire within grace period");
        }
    }
}

/// Completion signal a cancelled session's peers can wait on.
#[derive(Default)]
struct Retirement {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Retirement {
    fn signal(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        *done = true;
        self.signal.notify_all();
    }

    fn wait(&self, timeout: Duration) -> bool {
        let done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        let result = self
            .signal
            .wait_timeout_while(done, timeout, |done| !*done);
        match result {
            Ok((_, timed_out)) => !timed_out.timed_out(),
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }
}

/// Relay one accepted connection over the shared channel.
///
/// Pump A (client -> channel) runs on its own thread; pump B
/// (channel -> client) runs here. The session completes only when both
/// pumps have returned, so a half-duplex client that finishes writing
/// before reading is not torn down early.
pub(crate) fn run(
    id: u64,
    client: TcpStream,
    chan_reader: ChannelHandle,
    chan_writer: ChannelHandle,
    slot: &SessionSlot,
    stopping: &AtomicBool,
) {
    let cancel = Arc::new(AtomicBool::new(false));
    let retirement = Arc::new(Retirement::default());

    if !slot.admit(id, &client, &cancel, &retirement, stopping) {
        let _ = client.shutdown(Shutdown::Both);
        return;
    }

    run_pumps(id, client, chan_reader, chan_writer, &cancel);

    // Signal before touching the slot: a preemptor waits on the retirement
    // signal while holding the slot lock.
    retirement.signal();
    slot.retire(id);
    debug!(session = id, "session complete");
}

fn run_pumps(
    id: u64,
    client: TcpStream,
    mut chan_reader: ChannelHandle,
    mut chan_writer: ChannelHandle,
    cancel: &Arc<AtomicBool>,
) {
    let mut tcp_reader = match client.try_clone() {
        Ok(stream) => stream,
        Err(err) => {
            warn!(session = id, error = %err, "cannot split client socket");
            return;
        }
    };
    let mut tcp_writer = client;

    let inbound = {
        let cancel = Arc::clone(cancel);
        thread::spawn(move || pump::run(&mut tcp_reader, &mut chan_writer, &cancel))
    };

    let outbound = pump::run(&mut chan_reader, &mut tcp_writer, cancel);
    log_pump_result(id, "outbound", outbound);

    // Pump B returning at all means the channel side or the client is
    // finished; release the client socket so pump A unblocks too. The
    // shared channel itself is never shut down here.
    cancel.store(true, Ordering::SeqCst);
    let _ = tcp_writer.shutdown(Shutdown::Both);

    let inbound = inbound
        .join()
        .unwrap_or_else(|_| Err(std::io::Error::other("inbound pump panicked")));
    log_pump_result(id, "inbound", inbound);
}

fn log_pump_result(session: u64, direction: &'static str, result: std::io::Result<u64>) {
    match result {
        Ok(bytes) => debug!(session, direction, bytes, "pump finished"),
        Err(source) if is_disconnect(&source) => {
            debug!(session, direction, error = %source, "pump ended on disconnect");
        }
        Err(source) => {
            let err = RelayError::Pump {
                session,
                direction,
                source,
            };
            warn!(error = %err, "pump failed");
        }
    }
}

fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retirement_wait_observes_signal() {
        let retirement = Arc::new(Retirement::default());
        let waiter = Arc::clone(&retirement);

        let handle = thread::spawn(move || waiter.wait(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        retirement.signal();

        assert!(handle.join().expect("waiter thread should finish"));
    }

    #[test]
    fn retirement_wait_times_out_without_signal() {
        let retirement = Retirement::default();
        assert!(!retirement.wait(Duration::from_millis(20)));
    }

    #[test]
    fn disconnect_kinds_are_not_failures() {
        assert!(is_disconnect(&std::io::Error::from(ErrorKind::BrokenPipe)));
        assert!(is_disconnect(&std::io::Error::from(
            ErrorKind::ConnectionReset
        )));
        assert!(!is_disconnect(&std::io::Error::from(
            ErrorKind::PermissionDenied
        )));
    }
}
