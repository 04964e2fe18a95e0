//! Blocking session facade over one attached device
//!
//! [`Device`] is the handle the lifecycle manager hands out for an
//! attached device; [`Device::open`] yields a [`DeviceSession`] with
//! the read/write/poll surface. Sessions are reference counted: the
//! device record lives until the last of {registry entry, open
//! sessions, dispatch thread} lets go of it, so neither a detach nor
//! a close can free state a pending completion still needs.

use crate::device::{DeviceShared, DeviceState};
use crate::error::{Error, Result};
use crate::pump::PumpState;
use crate::report::Report;
use crate::transport::{CompletionStatus, IN_TRANSFER_LEN};
use std::fmt;
use std::sync::{Arc, Condvar, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Driver-assigned identifier for an attached device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How long a session call may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Block until the condition is met or the device detaches.
    Blocking,
    /// Block at most this long, then fail with `TimedOut`.
    Timeout(Duration),
    /// Never block: fail immediately with `WouldBlock` / `Busy`.
    /// A non-blocking write returns right after submission; its
    /// completion status is discarded.
    NonBlocking,
}

impl Wait {
    fn deadline(self) -> Option<Instant> {
        match self {
            Wait::Timeout(duration) => Some(Instant::now() + duration),
            _ => None,
        }
    }
}

/// Result of [`DeviceSession::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// A `read` would return without blocking (a report is queued, or
    /// the device is gone and `read` would fail fast).
    pub readable: bool,
    /// A `write` would be admitted without blocking.
    pub writable: bool,
}

/// Handle to one attached device.
#[derive(Clone)]
pub struct Device {
    shared: Arc<DeviceShared>,
}

impl Device {
    pub(crate) fn new(shared: Arc<DeviceShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<DeviceShared> {
        &self.shared
    }

    pub fn id(&self) -> DeviceId {
        self.shared.id
    }

    /// Open a session. The first open arms the inbound pump with the
    /// initial receive; later opens share the running pump.
    pub fn open(&self) -> Result<DeviceSession> {
        // Taken before the device mutex so a concurrent detach cannot
        // slip between the attached check and the pump arming.
        let _attach = self.shared.attach_guard.lock().unwrap();
        let mut state = self.shared.lock();
        if !state.is_attached() {
            return Err(Error::Disconnected);
        }
        if state.open_count == 0 {
            let Some(transport) = state.transport.clone() else {
                return Err(Error::Disconnected);
            };
            // A fresh session never sees reports queued before it.
            state.ring.clear();
            state.in_running = true;
            match transport.submit_in(IN_TRANSFER_LEN) {
                Ok(handle) => state.in_pump = PumpState::Submitted(handle),
                Err(error) => {
                    state.in_running = false;
                    state.in_pump = PumpState::Idle;
                    warn!(device = %self.shared.id, %error, "failed to arm inbound pump");
                    return Err(Error::Transport(error));
                }
            }
        }
        state.open_count += 1;
        debug!(
            device = %self.shared.id,
            open_count = state.open_count,
            "session opened"
        );
        Ok(DeviceSession {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Whether the device is still attached to its transport.
    pub fn is_attached(&self) -> bool {
        self.shared.lock().is_attached()
    }

    /// Whether the driver has enabled the device (set at attach,
    /// cleared at detach).
    pub fn is_enabled(&self) -> bool {
        self.shared.lock().enabled
    }

    /// Whether the last inbound report left the device out of range
    /// or asleep.
    pub fn is_offline(&self) -> bool {
        self.shared.lock().filter.is_offline()
    }

    pub fn compress_wheel_events(&self) -> bool {
        self.shared.lock().filter.compress_wheel()
    }

    pub fn set_compress_wheel_events(&self, enabled: bool) {
        self.shared.lock().filter.set_compress_wheel(enabled);
    }

    pub fn suppress_offline_events(&self) -> bool {
        self.shared.lock().filter.suppress_offline()
    }

    pub fn set_suppress_offline_events(&self, enabled: bool) {
        self.shared.lock().filter.set_suppress_offline(enabled);
    }
}

/// One open session. Closing (or dropping) the last session cancels
/// any in-flight transfers; the device record itself stays alive for
/// as long as anything still references it.
pub struct DeviceSession {
    shared: Arc<DeviceShared>,
}

impl DeviceSession {
    /// Take the oldest queued report.
    pub fn read(&self, wait: Wait) -> Result<Report> {
        let deadline = wait.deadline();
        let mut state = self.shared.lock();
        loop {
            if let Some(report) = state.ring.pop() {
                trace!(device = %self.shared.id, %report, "report delivered");
                return Ok(report);
            }
            if !state.is_attached() || state.in_pump == PumpState::Stopped {
                return Err(Error::Disconnected);
            }
            if wait == Wait::NonBlocking {
                return Err(Error::WouldBlock);
            }
            if deadline_elapsed(deadline) {
                return Err(Error::TimedOut);
            }
            state = block_on(&self.shared.data_available, state, deadline);
        }
    }

    /// Send one report to the device.
    ///
    /// Admission to the single write slot is first come, first
    /// served; in the blocking modes the call then waits for that
    /// specific transfer's completion and returns its outcome.
    pub fn write(&self, report: Report, wait: Wait) -> Result<()> {
        let awaited = wait != Wait::NonBlocking;
        let deadline = wait.deadline();
        let mut state = self.shared.lock();

        let ticket = loop {
            if !state.is_attached() {
                return Err(Error::Disconnected);
            }
            if let Some(ticket) = state.slot.try_begin(&report, awaited) {
                break ticket;
            }
            if wait == Wait::NonBlocking {
                return Err(Error::Busy);
            }
            if deadline_elapsed(deadline) {
                return Err(Error::TimedOut);
            }
            state = block_on(&self.shared.write_free, state, deadline);
        };

        // Submitting under the mutex keeps the completion handler
        // from racing the slot bookkeeping.
        let Some(transport) = state.transport.clone() else {
            state.slot.abandon(ticket);
            return Err(Error::Disconnected);
        };
        match transport.submit_out(state.slot.buffer()) {
            Ok(handle) => {
                state.slot.submitted(ticket, handle);
                state.out_pump = PumpState::Submitted(handle);
                trace!(device = %self.shared.id, %report, "write submitted");
            }
            Err(error) => {
                state.slot.abandon(ticket);
                drop(state);
                self.shared.write_free.notify_all();
                return Err(Error::Transport(error));
            }
        }

        if !awaited {
            return Ok(());
        }

        loop {
            if let Some(status) = state.slot.take_result(ticket) {
                drop(state);
                self.shared.write_free.notify_all();
                return match status {
                    CompletionStatus::Success => Ok(()),
                    CompletionStatus::Cancelled | CompletionStatus::Shutdown => {
                        Err(Error::Disconnected)
                    }
                    CompletionStatus::Error(error) => Err(Error::Transport(error)),
                };
            }
            if !state.is_attached() {
                state.slot.disown(ticket);
                return Err(Error::Disconnected);
            }
            if deadline_elapsed(deadline) {
                state.slot.disown(ticket);
                return Err(Error::TimedOut);
            }
            state = block_on(&self.shared.write_free, state, deadline);
        }
    }

    /// Current readability/writability without blocking.
    pub fn poll(&self) -> Readiness {
        let state = self.shared.lock();
        Readiness {
            readable: !state.ring.is_empty()
                || !state.is_attached()
                || state.in_pump == PumpState::Stopped,
            writable: state.slot.is_free(),
        }
    }

    /// Close the session. Equivalent to dropping it.
    pub fn close(self) {}
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.open_count = state.open_count.saturating_sub(1);
        debug!(
            device = %self.shared.id,
            open_count = state.open_count,
            "session closed"
        );
        if state.open_count == 0 {
            state.abort_transfers();
        }
    }
}

fn deadline_elapsed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Wait on `condvar`, bounded by `deadline`. Callers re-check their
/// predicate after waking; spurious wakeups are harmless.
fn block_on<'a>(
    condvar: &Condvar,
    guard: MutexGuard<'a, DeviceState>,
    deadline: Option<Instant>,
) -> MutexGuard<'a, DeviceState> {
    match deadline {
        None => condvar.wait(guard).unwrap(),
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return guard;
            }
            condvar.wait_timeout(guard, remaining).unwrap().0
        }
    }
}
