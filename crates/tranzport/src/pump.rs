//! Transfer completion pumps
//!
//! One state machine per direction, driven by [`Completion`] events
//! from the transport. The inbound pump is the steady-state loop that
//! replaces a blocking hardware read: every completion that is not a
//! cancellation ends in a fresh submission, so there is always an
//! armed receive while a session is open. The outbound pump is
//! one-shot: it only releases the write slot and wakes writers.
//!
//! Pump handlers never block. They mutate shared state under the
//! device mutex and signal the wait conditions, nothing else.

use crate::device::{DeviceShared, DeviceState};
use crate::filter::FilterAction;
use crate::report::{REPORT_LEN, Report};
use crate::transport::{Completion, CompletionStatus, TransferHandle};
use tracing::{debug, trace, warn};

/// Lifecycle of one direction's transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PumpState {
    /// No transfer in flight.
    Idle,
    /// Waiting for this transfer's completion.
    Submitted(TransferHandle),
    /// Terminal: cancelled, shut down, or resubmission failed. Only
    /// re-arming through `open()` leaves this state.
    Stopped,
}

/// Entry point for the per-device dispatch thread.
pub(crate) fn dispatch(shared: &DeviceShared, completion: Completion) {
    match completion {
        Completion::In {
            handle,
            status,
            data,
        } => in_complete(shared, handle, status, &data),
        Completion::Out { handle, status } => out_complete(shared, handle, status),
    }
}

fn in_complete(
    shared: &DeviceShared,
    handle: TransferHandle,
    status: CompletionStatus,
    data: &[u8],
) {
    let mut state = shared.lock();
    match state.in_pump {
        PumpState::Submitted(h) if h == handle => {}
        _ => {
            trace!(device = shared.id.0, ?handle, "stale inbound completion ignored");
            return;
        }
    }
    state.in_pump = PumpState::Idle;

    match status {
        CompletionStatus::Cancelled | CompletionStatus::Shutdown => {
            debug!(device = shared.id.0, ?status, "inbound pump stopping");
            state.in_pump = PumpState::Stopped;
            drop(state);
            shared.data_available.notify_all();
            return;
        }
        CompletionStatus::Error(error) => {
            debug!(
                device = shared.id.0,
                %error,
                "inbound transfer failed, resubmitting"
            );
            resubmit_in(shared, &mut state);
            return;
        }
        CompletionStatus::Success => {}
    }

    match Report::from_slice(data) {
        Some(report) => {
            trace!(device = shared.id.0, %report, "received report");
            let st: &mut DeviceState = &mut state;
            match st.filter.apply(&report, st.ring.newest()) {
                FilterAction::Suppress => {
                    trace!(device = shared.id.0, "report suppressed by filter");
                }
                FilterAction::Coalesce if st.ring.replace_newest(report) => {
                    trace!(device = shared.id.0, "wheel event coalesced");
                    shared.data_available.notify_one();
                }
                _ => {
                    if st.ring.push(report) {
                        trace!(device = shared.id.0, queued = st.ring.len(), "report queued");
                        shared.data_available.notify_one();
                    } else {
                        warn!(
                            device = shared.id.0,
                            "ring buffer overflow, report dropped"
                        );
                    }
                }
            }
        }
        None => {
            // Not a report; the transport anomaly stops here.
            warn!(
                device = shared.id.0,
                len = data.len(),
                expected = REPORT_LEN,
                "discarding inbound transfer with unexpected length"
            );
        }
    }

    resubmit_in(shared, &mut state);
}

/// Keep the pump armed. Falls to `Stopped` (and wakes readers, who
/// will see the device as gone) when the session intent flag is
/// cleared, the transport is detached, or submission fails.
pub(crate) fn resubmit_in(shared: &DeviceShared, state: &mut DeviceState) {
    if !state.in_running {
        state.in_pump = PumpState::Stopped;
        return;
    }
    let Some(transport) = state.transport.clone() else {
        state.in_pump = PumpState::Stopped;
        shared.data_available.notify_all();
        return;
    };
    match transport.submit_in(crate::transport::IN_TRANSFER_LEN) {
        Ok(handle) => state.in_pump = PumpState::Submitted(handle),
        Err(error) => {
            warn!(device = shared.id.0, %error, "inbound resubmission failed");
            state.in_pump = PumpState::Stopped;
            shared.data_available.notify_all();
        }
    }
}

fn out_complete(shared: &DeviceShared, handle: TransferHandle, status: CompletionStatus) {
    let mut state = shared.lock();
    if !state.slot.complete(handle, status) {
        trace!(device = shared.id.0, ?handle, "stale outbound completion ignored");
        return;
    }
    state.out_pump = PumpState::Idle;
    if let CompletionStatus::Error(error) = status {
        debug!(device = shared.id.0, %error, "outbound transfer failed");
    }
    drop(state);
    // Both admission waiters and the result waiter share this
    // condition; everyone re-checks their own predicate after waking.
    shared.write_free.notify_all();
}
