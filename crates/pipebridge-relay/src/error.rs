use pipebridge_channel::ChannelError;

/// Errors raised while establishing or running the relay.
///
/// Only [`RelayError::ChannelUnavailable`] and [`RelayError::Bind`] are ever
/// surfaced to callers (both from start). The remaining kinds are contained:
/// accept errors keep the loop running, pump errors end one session, and
/// teardown errors never escape stop.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The IPC channel could not be opened; the relay never starts listening.
    #[error("IPC channel unavailable: {0}")]
    ChannelUnavailable(#[from] ChannelError),

    /// No ephemeral loopback port could be bound.
    #[error("failed to bind loopback listener: {0}")]
    Bind(std::io::Error),

    /// A recoverable error while accepting a connection.
    #[error("accept failed: {0}")]
    Accept(std::io::Error),

    /// A read/write error inside one relay session.
    #[error("session {session} {direction} pump failed: {source}")]
    Pump {
        session: u64,
        direction: &'static str,
        source: std::io::Error,
    },

    /// A failure while releasing a resource during stop.
    #[error("teardown of {resource} failed: {source}")]
    Teardown {
        resource: &'static str,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, RelayError>;
