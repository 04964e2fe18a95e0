//! Test support utilities
//!
//! A scriptable in-memory transport plus small helpers shared by the
//! integration suites. Tests drive the whole driver through
//! [`MockTransport`]: they observe submissions, then complete them
//! with whatever status and payload the scenario calls for.

use crate::transport::{
    Completion, CompletionStatus, TransferHandle, Transport, TransportError,
};
use async_channel::{Receiver, Sender, unbounded};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Generous bound for anything a test waits on.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

struct MockState {
    pending_in: VecDeque<TransferHandle>,
    pending_out: VecDeque<(TransferHandle, Vec<u8>)>,
    cancelled: Vec<TransferHandle>,
    fail_submit_in: Option<TransportError>,
    fail_submit_out: Option<TransportError>,
}

/// In-memory [`Transport`] for tests.
pub struct MockTransport {
    state: Mutex<MockState>,
    next_handle: AtomicU64,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
}

impl MockTransport {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = unbounded();
        Self {
            state: Mutex::new(MockState {
                pending_in: VecDeque::new(),
                pending_out: VecDeque::new(),
                cancelled: Vec::new(),
                fail_submit_in: None,
                fail_submit_out: None,
            }),
            next_handle: AtomicU64::new(1),
            completion_tx,
            completion_rx,
        }
    }

    /// Number of inbound transfers submitted and not yet completed.
    pub fn pending_in(&self) -> usize {
        self.state.lock().unwrap().pending_in.len()
    }

    /// Number of outbound transfers submitted and not yet completed.
    pub fn pending_out(&self) -> usize {
        self.state.lock().unwrap().pending_out.len()
    }

    /// Handles `cancel` has been called for so far.
    pub fn cancelled(&self) -> Vec<TransferHandle> {
        self.state.lock().unwrap().cancelled.clone()
    }

    /// Make the next `submit_in` fail with `error`.
    pub fn fail_next_submit_in(&self, error: TransportError) {
        self.state.lock().unwrap().fail_submit_in = Some(error);
    }

    /// Make the next `submit_out` fail with `error`.
    pub fn fail_next_submit_out(&self, error: TransportError) {
        self.state.lock().unwrap().fail_submit_out = Some(error);
    }

    /// Complete the oldest pending inbound transfer with `status` and
    /// `data` (any length; the pump validates it). Returns `false`
    /// when nothing is pending.
    pub fn complete_next_in(&self, status: CompletionStatus, data: &[u8]) -> bool {
        let handle = {
            let mut state = self.state.lock().unwrap();
            match state.pending_in.pop_front() {
                Some(handle) => handle,
                None => return false,
            }
        };
        let _ = self.completion_tx.send_blocking(Completion::In {
            handle,
            status,
            data: data.to_vec(),
        });
        true
    }

    /// Successfully deliver one 8-byte report.
    pub fn deliver(&self, bytes: [u8; 8]) -> bool {
        self.complete_next_in(CompletionStatus::Success, &bytes)
    }

    /// Complete the oldest pending outbound transfer with `status`,
    /// returning the bytes that were submitted.
    pub fn complete_next_out(&self, status: CompletionStatus) -> Option<Vec<u8>> {
        let (handle, data) = {
            let mut state = self.state.lock().unwrap();
            state.pending_out.pop_front()?
        };
        let _ = self
            .completion_tx
            .send_blocking(Completion::Out { handle, status });
        Some(data)
    }

    /// Close the completion channel, as a transport backend does when
    /// it shuts down. Ends the device's dispatch thread.
    pub fn close(&self) {
        self.completion_tx.close();
    }
}

impl Transport for MockTransport {
    fn submit_in(&self, _len: usize) -> Result<TransferHandle, TransportError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.fail_submit_in.take() {
            return Err(error);
        }
        let handle = TransferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        state.pending_in.push_back(handle);
        Ok(handle)
    }

    fn submit_out(&self, data: &[u8]) -> Result<TransferHandle, TransportError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.fail_submit_out.take() {
            return Err(error);
        }
        let handle = TransferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        state.pending_out.push_back((handle, data.to_vec()));
        Ok(handle)
    }

    fn cancel(&self, handle: TransferHandle) {
        let direction = {
            let mut state = self.state.lock().unwrap();
            state.cancelled.push(handle);
            if let Some(pos) = state.pending_in.iter().position(|h| *h == handle) {
                state.pending_in.remove(pos);
                Some(true)
            } else if let Some(pos) =
                state.pending_out.iter().position(|(h, _)| *h == handle)
            {
                state.pending_out.remove(pos);
                Some(false)
            } else {
                None
            }
        };
        // Cancelled transfers still complete, with a Cancelled status.
        match direction {
            Some(true) => {
                let _ = self.completion_tx.send_blocking(Completion::In {
                    handle,
                    status: CompletionStatus::Cancelled,
                    data: Vec::new(),
                });
            }
            Some(false) => {
                let _ = self.completion_tx.send_blocking(Completion::Out {
                    handle,
                    status: CompletionStatus::Cancelled,
                });
            }
            None => {}
        }
    }

    fn completions(&self) -> Receiver<Completion> {
        self.completion_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submissions_are_recorded() {
        let mock = MockTransport::new();
        let h1 = mock.submit_in(8).unwrap();
        let h2 = mock.submit_out(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_ne!(h1, h2);
        assert_eq!(mock.pending_in(), 1);
        assert_eq!(mock.pending_out(), 1);
    }

    #[test]
    fn test_cancel_emits_cancelled_completion() {
        let mock = MockTransport::new();
        let handle = mock.submit_in(8).unwrap();
        mock.cancel(handle);
        assert_eq!(mock.pending_in(), 0);
        assert_eq!(mock.cancelled(), vec![handle]);

        let completion = mock.completions().recv_blocking().unwrap();
        match completion {
            Completion::In { handle: h, status, .. } => {
                assert_eq!(h, handle);
                assert_eq!(status, CompletionStatus::Cancelled);
            }
            Completion::Out { .. } => panic!("expected inbound completion"),
        }
    }

    #[test]
    fn test_scripted_submit_failure() {
        let mock = MockTransport::new();
        mock.fail_next_submit_in(TransportError::NoDevice);
        assert_eq!(mock.submit_in(8), Err(TransportError::NoDevice));
        assert!(mock.submit_in(8).is_ok());
    }
}
