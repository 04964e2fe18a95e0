//! Driver error types

use crate::transport::TransportError;
use thiserror::Error;

/// Errors surfaced to session callers.
///
/// Anything the pumps can recover from internally (transient inbound
/// failures, malformed transfer lengths) never appears here. Device
/// loss is a normal event, not a fatal one.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The device has been detached; the transport handle is gone.
    #[error("device disconnected")]
    Disconnected,

    /// The caller-supplied deadline elapsed.
    #[error("operation timed out")]
    TimedOut,

    /// Non-blocking read found the ring buffer empty.
    #[error("no report available")]
    WouldBlock,

    /// Non-blocking write found a prior write still in flight.
    #[error("a write is already in flight")]
    Busy,

    /// An outbound transfer (or its submission) failed.
    #[error("transfer failed: {0}")]
    Transport(TransportError),
}

pub type Result<T> = std::result::Result<T, Error>;
