//! Inbound report ring buffer
//!
//! All interrupt-in completions land here so readers never race the
//! transport. The buffer is pre-allocated at its configured capacity
//! and never resizes; only the inbound pump advances `head` and only
//! `DeviceSession::read` advances `tail`, both under the device mutex.

use crate::report::Report;

/// Fixed-capacity FIFO of reports.
pub(crate) struct RingBuffer {
    slots: Box<[Report]>,
    head: usize,
    tail: usize,
    len: usize,
}

impl RingBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        // A zero-capacity ring would wedge every reader; config
        // validation rejects it, this is the last line of defense.
        let capacity = capacity.max(1);
        Self {
            slots: vec![Report::default(); capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Append a report. Returns `false` if the buffer was full, in
    /// which case the incoming report is dropped (capacity sizing is
    /// expected to make this unreachable in practice).
    pub(crate) fn push(&mut self, report: Report) -> bool {
        if self.len == self.slots.len() {
            return false;
        }
        self.slots[self.head] = report;
        self.head = (self.head + 1) % self.slots.len();
        self.len += 1;
        true
    }

    /// Remove and return the oldest report.
    pub(crate) fn pop(&mut self) -> Option<Report> {
        if self.len == 0 {
            return None;
        }
        let report = self.slots[self.tail];
        self.tail = (self.tail + 1) % self.slots.len();
        self.len -= 1;
        Some(report)
    }

    /// The most recently pushed, not yet popped report.
    pub(crate) fn newest(&self) -> Option<&Report> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.head + self.slots.len() - 1) % self.slots.len();
        Some(&self.slots[idx])
    }

    /// Overwrite the most recently pushed report in place (wheel
    /// event coalescing). Returns `false` when the buffer is empty.
    pub(crate) fn replace_newest(&mut self, report: Report) -> bool {
        if self.len == 0 {
            return false;
        }
        let idx = (self.head + self.slots.len() - 1) % self.slots.len();
        self.slots[idx] = report;
        true
    }

    /// Discard all buffered reports. Used when a fresh session opens.
    pub(crate) fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(tag: u8) -> Report {
        Report::from([tag, 0, 0, 0, 0, 0, 0, 0])
    }

    #[test]
    fn test_fifo_order() {
        let mut ring = RingBuffer::new(16);
        for tag in 0..10 {
            assert!(ring.push(report(tag)));
        }
        for tag in 0..10 {
            assert_eq!(ring.pop(), Some(report(tag)));
        }
        assert!(ring.pop().is_none());
        assert!(ring.is_empty());
    }

    #[test]
    fn test_wraparound_preserves_order() {
        // Capacity 4: push A..D, pop A, push E, expect B, C, D, E.
        let mut ring = RingBuffer::new(4);
        for tag in [b'A', b'B', b'C', b'D'] {
            assert!(ring.push(report(tag)));
        }
        assert_eq!(ring.pop(), Some(report(b'A')));
        assert!(ring.push(report(b'E')));
        for tag in [b'B', b'C', b'D', b'E'] {
            assert_eq!(ring.pop(), Some(report(tag)));
        }
        assert!(ring.pop().is_none());
    }

    #[test]
    fn test_push_full_drops_incoming() {
        let mut ring = RingBuffer::new(2);
        assert!(ring.push(report(1)));
        assert!(ring.push(report(2)));
        assert!(!ring.push(report(3)));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.pop(), Some(report(1)));
        assert_eq!(ring.pop(), Some(report(2)));
    }

    #[test]
    fn test_replace_newest() {
        let mut ring = RingBuffer::new(4);
        assert!(!ring.replace_newest(report(9)));
        ring.push(report(1));
        ring.push(report(2));
        assert_eq!(ring.newest(), Some(&report(2)));
        assert!(ring.replace_newest(report(7)));
        assert_eq!(ring.pop(), Some(report(1)));
        assert_eq!(ring.pop(), Some(report(7)));
    }

    #[test]
    fn test_clear() {
        let mut ring = RingBuffer::new(4);
        ring.push(report(1));
        ring.push(report(2));
        ring.clear();
        assert!(ring.is_empty());
        assert!(ring.pop().is_none());
        assert!(ring.push(report(3)));
        assert_eq!(ring.pop(), Some(report(3)));
    }
}
