//! Outbound write slot
//!
//! The device accepts one outbound command at a time, so all writes
//! funnel through this single-buffer slot. A write that finds the
//! slot occupied waits on the write-free condition; the outbound pump
//! clears the slot when the transfer completes.

use crate::report::{REPORT_LEN, Report};
use crate::transport::{CompletionStatus, TransferHandle};

/// Identifies one admitted write so its completion status reaches the
/// writer that submitted it and nobody else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WriteTicket(u64);

#[derive(Debug, Clone, Copy)]
struct InFlight {
    ticket: WriteTicket,
    handle: Option<TransferHandle>,
    /// Whether a writer is going to collect the completion status.
    awaited: bool,
}

/// Single in-flight outbound transfer state holder.
pub(crate) struct WriteSlot {
    busy: bool,
    buffer: [u8; REPORT_LEN],
    next_ticket: u64,
    in_flight: Option<InFlight>,
    /// Completion status of an awaited write, held until collected.
    result: Option<(WriteTicket, CompletionStatus)>,
}

impl WriteSlot {
    pub(crate) fn new() -> Self {
        Self {
            busy: false,
            buffer: [0; REPORT_LEN],
            next_ticket: 0,
            in_flight: None,
            result: None,
        }
    }

    /// Whether a new write could be admitted right now.
    ///
    /// An uncollected awaited result keeps the slot occupied: handing
    /// the buffer to a second writer before the first has observed
    /// its status would silently discard that status.
    pub(crate) fn is_free(&self) -> bool {
        !self.busy && self.result.is_none()
    }

    /// Admit a write: copy the report into the slot buffer and mark
    /// busy. Fails while a prior write is in flight or unconsumed.
    pub(crate) fn try_begin(&mut self, report: &Report, awaited: bool) -> Option<WriteTicket> {
        if !self.is_free() {
            return None;
        }
        let ticket = WriteTicket(self.next_ticket);
        self.next_ticket += 1;
        self.busy = true;
        self.buffer.copy_from_slice(report.as_bytes());
        self.in_flight = Some(InFlight {
            ticket,
            handle: None,
            awaited,
        });
        Some(ticket)
    }

    /// Record the transfer handle once submission succeeded.
    pub(crate) fn submitted(&mut self, ticket: WriteTicket, handle: TransferHandle) {
        if let Some(in_flight) = self.in_flight.as_mut()
            && in_flight.ticket == ticket
        {
            in_flight.handle = Some(handle);
        }
    }

    /// Roll back an admission whose submission failed.
    pub(crate) fn abandon(&mut self, ticket: WriteTicket) {
        if let Some(in_flight) = self.in_flight
            && in_flight.ticket == ticket
        {
            self.in_flight = None;
            self.busy = false;
        }
    }

    /// The writer stopped waiting (timeout or disconnect): drop any
    /// interest in the outcome so the slot cannot wedge on a result
    /// nobody will collect.
    pub(crate) fn disown(&mut self, ticket: WriteTicket) {
        if let Some((t, _)) = self.result
            && t == ticket
        {
            self.result = None;
        }
        if let Some(in_flight) = self.in_flight.as_mut()
            && in_flight.ticket == ticket
        {
            in_flight.awaited = false;
        }
    }

    /// Completion from the outbound pump. Clears busy regardless of
    /// status; the status is recorded only if a writer awaits it.
    /// Returns `false` for completions of transfers this slot no
    /// longer tracks (stale after a reset).
    pub(crate) fn complete(&mut self, handle: TransferHandle, status: CompletionStatus) -> bool {
        match self.in_flight {
            Some(in_flight) if in_flight.handle == Some(handle) => {
                self.in_flight = None;
                self.busy = false;
                if in_flight.awaited {
                    self.result = Some((in_flight.ticket, status));
                }
                true
            }
            _ => false,
        }
    }

    /// Collect the completion status of an awaited write.
    pub(crate) fn take_result(&mut self, ticket: WriteTicket) -> Option<CompletionStatus> {
        match self.result {
            Some((t, status)) if t == ticket => {
                self.result = None;
                Some(status)
            }
            _ => None,
        }
    }

    /// Handle of the transfer currently in flight, if any.
    pub(crate) fn in_flight_handle(&self) -> Option<TransferHandle> {
        self.in_flight.and_then(|f| f.handle)
    }

    /// Slot buffer as submitted to the transport.
    pub(crate) fn buffer(&self) -> &[u8; REPORT_LEN] {
        &self.buffer
    }

    /// Detach teardown: forget everything. Completions arriving after
    /// a reset are ignored by `complete`.
    pub(crate) fn reset(&mut self) {
        self.busy = false;
        self.in_flight = None;
        self.result = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    fn report() -> Report {
        Report::from([1, 2, 3, 4, 5, 6, 7, 8])
    }

    #[test]
    fn test_mutual_exclusion() {
        let mut slot = WriteSlot::new();
        let ticket = slot.try_begin(&report(), true).unwrap();
        assert!(!slot.is_free());
        assert!(slot.try_begin(&report(), true).is_none());

        slot.submitted(ticket, TransferHandle(1));
        assert!(slot.complete(TransferHandle(1), CompletionStatus::Success));
        // Result pending collection keeps the slot occupied.
        assert!(!slot.is_free());
        assert_eq!(
            slot.take_result(ticket),
            Some(CompletionStatus::Success)
        );
        assert!(slot.is_free());
    }

    #[test]
    fn test_unawaited_result_is_discarded() {
        let mut slot = WriteSlot::new();
        let ticket = slot.try_begin(&report(), false).unwrap();
        slot.submitted(ticket, TransferHandle(9));
        assert!(slot.complete(TransferHandle(9), CompletionStatus::Success));
        assert!(slot.is_free());
        assert!(slot.take_result(ticket).is_none());
    }

    #[test]
    fn test_stale_completion_ignored() {
        let mut slot = WriteSlot::new();
        let ticket = slot.try_begin(&report(), true).unwrap();
        slot.submitted(ticket, TransferHandle(1));
        assert!(!slot.complete(TransferHandle(2), CompletionStatus::Success));
        assert!(!slot.is_free());

        slot.reset();
        assert!(!slot.complete(TransferHandle(1), CompletionStatus::Success));
        assert!(slot.is_free());
    }

    #[test]
    fn test_error_status_reaches_writer() {
        let mut slot = WriteSlot::new();
        let ticket = slot.try_begin(&report(), true).unwrap();
        slot.submitted(ticket, TransferHandle(3));
        slot.complete(
            TransferHandle(3),
            CompletionStatus::Error(TransportError::Pipe),
        );
        assert_eq!(
            slot.take_result(ticket),
            Some(CompletionStatus::Error(TransportError::Pipe))
        );
    }

    #[test]
    fn test_disown_releases_slot() {
        let mut slot = WriteSlot::new();

        // Disown before completion: the later completion frees the slot.
        let ticket = slot.try_begin(&report(), true).unwrap();
        slot.submitted(ticket, TransferHandle(1));
        slot.disown(ticket);
        assert!(slot.complete(TransferHandle(1), CompletionStatus::Success));
        assert!(slot.is_free());

        // Disown after completion: the stored result is dropped.
        let ticket = slot.try_begin(&report(), true).unwrap();
        slot.submitted(ticket, TransferHandle(2));
        slot.complete(TransferHandle(2), CompletionStatus::Success);
        assert!(!slot.is_free());
        slot.disown(ticket);
        assert!(slot.is_free());
    }

    #[test]
    fn test_abandon_after_failed_submit() {
        let mut slot = WriteSlot::new();
        let ticket = slot.try_begin(&report(), true).unwrap();
        slot.abandon(ticket);
        assert!(slot.is_free());
        assert!(slot.in_flight_handle().is_none());
    }

    #[test]
    fn test_buffer_holds_report_bytes() {
        let mut slot = WriteSlot::new();
        slot.try_begin(&report(), false).unwrap();
        assert_eq!(slot.buffer(), report().as_bytes());
    }
}
