//! Delivery filtering policy
//!
//! Two independent, stackable heuristics applied before a report is
//! queued for readers. Both default off: they trade data for queue
//! pressure relief, and droppy behavior has to be opted into.

use crate::report::Report;

/// What to do with an inbound report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FilterAction {
    /// Queue it normally.
    Deliver,
    /// Replace the newest undelivered report instead of appending.
    Coalesce,
    /// Drop it; readers never see it.
    Suppress,
}

/// Offline tracking. The device keeps sending "still offline" reports
/// while out of range; exactly one of them is worth delivering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfflinePhase {
    Online,
    /// First offline marker seen and passed up.
    Reported,
    /// Further markers are redundant.
    Suppressed,
}

pub(crate) struct DeliveryFilter {
    suppress_offline: bool,
    compress_wheel: bool,
    phase: OfflinePhase,
}

impl DeliveryFilter {
    pub(crate) fn new(suppress_offline: bool, compress_wheel: bool) -> Self {
        Self {
            suppress_offline,
            compress_wheel,
            phase: OfflinePhase::Online,
        }
    }

    /// Whether the device currently reports itself out of range.
    ///
    /// Tracked regardless of the suppression toggle so the `offline`
    /// attribute stays meaningful.
    pub(crate) fn is_offline(&self) -> bool {
        self.phase != OfflinePhase::Online
    }

    pub(crate) fn compress_wheel(&self) -> bool {
        self.compress_wheel
    }

    pub(crate) fn set_compress_wheel(&mut self, enabled: bool) {
        self.compress_wheel = enabled;
    }

    pub(crate) fn suppress_offline(&self) -> bool {
        self.suppress_offline
    }

    pub(crate) fn set_suppress_offline(&mut self, enabled: bool) {
        self.suppress_offline = enabled;
    }

    /// Classify an inbound report. `newest_queued` is the most recent
    /// undelivered report, if any.
    pub(crate) fn apply(
        &mut self,
        report: &Report,
        newest_queued: Option<&Report>,
    ) -> FilterAction {
        let mut redundant_offline = false;
        match (self.phase, report.is_offline_marker()) {
            (OfflinePhase::Online, true) => self.phase = OfflinePhase::Reported,
            (OfflinePhase::Reported, true) => {
                self.phase = OfflinePhase::Suppressed;
                redundant_offline = true;
            }
            (OfflinePhase::Suppressed, true) => redundant_offline = true,
            (_, false) => self.phase = OfflinePhase::Online,
        }

        if self.suppress_offline && redundant_offline {
            return FilterAction::Suppress;
        }

        if self.compress_wheel
            && report.is_wheel_turn()
            && newest_queued.is_some_and(Report::is_wheel_turn)
        {
            return FilterAction::Coalesce;
        }

        FilterAction::Deliver
    }
}
