//! Error types shared across the engine.
use std::io;

use thiserror::Error;

/// A start address that could not be parsed as a dotted quad.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address '{input}': {reason}")]
    InvalidAddress { input: String, reason: String },
}

/// Failures raised while probing a single target.
///
/// These never leave the task that produced them. The worker either drops
/// them silently (see [`ScanError::is_expected`]) or reports them against
/// the address.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("deadline exceeded")]
    Timeout,

    #[error("unexpected packet ID: {0}")]
    UnexpectedPacketId(u8),

    #[error("varint too large")]
    VarIntTooLarge,

    #[error("maximum response length exceeded ({declared} > {limit})")]
    MaximumResponseLength { declared: u64, limit: usize },

    #[error("short datagram: expected {expected} bytes, got {got}")]
    ShortDatagram { expected: usize, got: usize },

    #[error("connection transport does not match the protocol")]
    TransportMismatch,
}

impl ScanError {
    /// Deadline, reset, refusal and end-of-stream are normal scan misses.
    ///
    /// Refusal shows up on connected datagram sockets when the remote host
    /// answers with ICMP port unreachable.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Failures writing to a persistence sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// Failures turning a scan payload into a persisted record.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("decoding payload: {0}")]
    Decode(String),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Fatal engine failures, raised before any address is dispatched.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("persistence sink unavailable: {0}")]
    SinkUnavailable(#[source] SinkError),

    #[error("opening output file: {0}")]
    Output(#[source] io::Error),
}
