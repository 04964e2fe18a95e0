//! The fixed-size report unit exchanged with the device

use std::fmt;

/// Every Tranzport report is exactly this many bytes, both directions.
pub const REPORT_LEN: usize = 8;

/// One 8-byte interrupt report.
///
/// The payload is opaque to the driver core; the only bytes it ever
/// inspects are the two the delivery filters key on (see
/// [`Report::is_offline_marker`] and [`Report::is_wheel_turn`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Report([u8; REPORT_LEN]);

impl Report {
    /// Create a report from exactly [`REPORT_LEN`] bytes.
    ///
    /// Returns `None` for any other length; a transfer that does not
    /// yield exactly 8 bytes never becomes a report.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let bytes: [u8; REPORT_LEN] = data.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Raw report bytes.
    pub fn as_bytes(&self) -> &[u8; REPORT_LEN] {
        &self.0
    }

    /// The device signals "out of range or asleep" with 0xFF in the
    /// second byte.
    pub(crate) fn is_offline_marker(&self) -> bool {
        self.0[1] == 0xff
    }

    /// The shuttle wheel delta lives in byte 6; nonzero means this
    /// report carries a wheel turn.
    pub(crate) fn is_wheel_turn(&self) -> bool {
        self.0[6] != 0
    }
}

impl From<[u8; REPORT_LEN]> for Report {
    fn from(bytes: [u8; REPORT_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
