//! Transport capability consumed by the driver core
//!
//! The core never talks to USB directly; it submits transfers through
//! this trait and consumes the resulting [`Completion`] events from a
//! channel. That keeps "what happens when a transfer finishes" as
//! data driving the pump state machines instead of a callback into
//! shared mutable state, and lets the test suite drive the whole
//! driver with a scripted transport.

use crate::report::REPORT_LEN;
use async_channel::Receiver;
use thiserror::Error;

/// Identifies one submitted transfer until its completion arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferHandle(pub u64);

/// Transport-level failure, mirroring the libusb error space.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("I/O error")]
    Io,
    #[error("endpoint stalled")]
    Pipe,
    #[error("device gone")]
    NoDevice,
    #[error("entity not found")]
    NotFound,
    #[error("resource busy")]
    Busy,
    #[error("buffer overflow")]
    Overflow,
    #[error("invalid parameter")]
    InvalidParam,
    #[error("access denied")]
    Access,
    #[error("transfer timed out")]
    Timeout,
}

/// Outcome of a finished transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// Transfer finished; inbound completions carry the payload.
    Success,
    /// The transfer was killed by `cancel`. Terminal for the pump.
    Cancelled,
    /// The transport is going away (device unplugged, backend
    /// shutdown). Terminal for the pump.
    Shutdown,
    /// Any other nonzero status. Inbound pumps recover by
    /// resubmitting; outbound writers see it as a failed write.
    Error(TransportError),
}

impl CompletionStatus {
    /// Statuses after which the pump must not resubmit.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Shutdown)
    }
}

/// One finished transfer, delivered on the completion channel.
#[derive(Debug, Clone)]
pub enum Completion {
    /// An interrupt-in transfer finished. `data` holds the actual
    /// payload; anything other than [`REPORT_LEN`] bytes is a
    /// transport anomaly the inbound pump discards.
    In {
        handle: TransferHandle,
        status: CompletionStatus,
        data: Vec<u8>,
    },
    /// An interrupt-out transfer finished.
    Out {
        handle: TransferHandle,
        status: CompletionStatus,
    },
}

/// Asynchronous transfer capability.
///
/// Submissions must not block: they are issued under the device
/// mutex. Exactly one completion event is eventually delivered per
/// successful submission, including after `cancel` (with a
/// [`CompletionStatus::Cancelled`] status). Closing the completion
/// channel ends the device's dispatch thread.
pub trait Transport: Send + Sync {
    /// Submit an interrupt-in transfer for a buffer of `len` bytes.
    fn submit_in(&self, len: usize) -> Result<TransferHandle, TransportError>;

    /// Submit an interrupt-out transfer carrying `data`.
    fn submit_out(&self, data: &[u8]) -> Result<TransferHandle, TransportError>;

    /// Request cancellation of an in-flight transfer. Completion of
    /// the cancelled transfer is still delivered.
    fn cancel(&self, handle: TransferHandle);

    /// The stream of completion events for this transport.
    fn completions(&self) -> Receiver<Completion>;
}

/// Expected inbound submission length, re-exported where the pumps
/// need it.
pub(crate) const IN_TRANSFER_LEN: usize = REPORT_LEN;
