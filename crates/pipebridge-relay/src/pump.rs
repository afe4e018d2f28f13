use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

const COPY_CHUNK_SIZE: usize = 8 * 1024;

/// Copy bytes from `source` to `sink` until EOF, cancellation, or an error.
///
/// Returns the number of bytes moved. `Interrupted` reads retry;
/// `WouldBlock`/`TimedOut` reads are idle ticks from a timed source and loop
/// back through the cancellation check without consuming anything. The pump
/// flushes the sink on every exit path and never closes either stream; the
/// caller owns both.
pub fn run<R, W>(source: &mut R, sink: &mut W, cancel: &AtomicBool) -> std::io::Result<u64>
where
    R: Read,
    W: Write,
{
    let mut chunk = [0u8; COPY_CHUNK_SIZE];
    let mut moved = 0u64;

    loop {
        if cancel.load(Ordering::SeqCst) {
            let _ = sink.flush();
            return Ok(moved);
        }

        let read = match source.read(&mut chunk) {
            Ok(0) => {
                let _ = sink.flush();
                return Ok(moved);
            }
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue
            }
            Err(err) => return Err(err),
        };

        sink.write_all(&chunk[..read])?;
        moved += read as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn copies_until_eof_and_counts_bytes() {
        let payload: Vec<u8> = (0..40_000).map(|i| (i % 251) as u8).collect();
        let mut source = std::io::Cursor::new(payload.clone());
        let mut sink = Vec::new();
        let cancel = AtomicBool::new(false);

        let moved = run(&mut source, &mut sink, &cancel).expect("pump should complete");

        assert_eq!(moved, payload.len() as u64);
        assert_eq!(sink, payload);
    }

    #[test]
    fn interrupted_read_retries() {
        struct InterruptedThenData {
            state: u8,
        }

        impl Read for InterruptedThenData {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                match self.state {
                    0 => {
                        self.state = 1;
                        Err(std::io::Error::from(ErrorKind::Interrupted))
                    }
                    1 => {
                        self.state = 2;
                        buf[..4].copy_from_slice(b"data");
                        Ok(4)
                    }
                    _ => Ok(0),
                }
            }
        }

        let mut source = InterruptedThenData { state: 0 };
        let mut sink = Vec::new();
        let cancel = AtomicBool::new(false);

        let moved = run(&mut source, &mut sink, &cancel).expect("pump should complete");
        assert_eq!(moved, 4);
        assert_eq!(sink, b"data");
    }

    #[test]
    fn cancellation_is_observed_on_idle_tick() {
        struct AlwaysIdle;

        impl Read for AlwaysIdle {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::WouldBlock))
            }
        }

        let mut source = AlwaysIdle;
        let mut sink = Vec::new();
        let cancel = AtomicBool::new(false);
        // First tick observes the flag set mid-loop.
        cancel.store(true, Ordering::SeqCst);

        let moved = run(&mut source, &mut sink, &cancel).expect("cancelled pump should return");
        assert_eq!(moved, 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn write_error_propagates() {
        struct FailingSink;

        impl Write for FailingSink {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::BrokenPipe))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut source = std::io::Cursor::new(b"payload".to_vec());
        let mut sink = FailingSink;
        let cancel = AtomicBool::new(false);

        let err = run(&mut source, &mut sink, &cancel).expect_err("write failure should surface");
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }
}
