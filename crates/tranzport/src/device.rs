//! The per-device record shared by sessions, pumps, and the driver
//!
//! Everything that can be touched from more than one thread lives in
//! [`DeviceState`] behind a single mutex: the ring, the write slot,
//! the pump states, the open count, and the transport handle itself.
//! The two condvars next to it are the data-available and
//! write-slot-free wait conditions.

use crate::config::DriverConfig;
use crate::filter::DeliveryFilter;
use crate::lifecycle::LifecycleState;
use crate::pump::PumpState;
use crate::ring::RingBuffer;
use crate::session::DeviceId;
use crate::slot::WriteSlot;
use crate::transport::Transport;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

pub(crate) struct DeviceState {
    pub(crate) ring: RingBuffer,
    pub(crate) slot: WriteSlot,
    pub(crate) open_count: u32,
    pub(crate) in_pump: PumpState,
    pub(crate) out_pump: PumpState,
    /// Session intent: true while some open session wants the inbound
    /// pump armed. Cleared by last close and by detach; the pump
    /// checks it before every resubmission.
    pub(crate) in_running: bool,
    /// The attached transport. `None` once detach has begun; every
    /// blocking operation observes "gone" through this.
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) lifecycle: LifecycleState,
    pub(crate) enabled: bool,
    pub(crate) filter: DeliveryFilter,
}

pub(crate) struct DeviceShared {
    pub(crate) id: DeviceId,
    pub(crate) state: Mutex<DeviceState>,
    pub(crate) data_available: Condvar,
    pub(crate) write_free: Condvar,
    /// Driver-wide guard serializing open() against detach().
    pub(crate) attach_guard: Arc<Mutex<()>>,
}

impl DeviceShared {
    pub(crate) fn new(
        id: DeviceId,
        transport: Arc<dyn Transport>,
        attach_guard: Arc<Mutex<()>>,
        config: &DriverConfig,
    ) -> Self {
        Self {
            id,
            state: Mutex::new(DeviceState {
                ring: RingBuffer::new(config.ring_capacity),
                slot: WriteSlot::new(),
                open_count: 0,
                in_pump: PumpState::Idle,
                out_pump: PumpState::Idle,
                in_running: false,
                transport: Some(transport),
                lifecycle: LifecycleState::Attached,
                enabled: true,
                filter: DeliveryFilter::new(
                    config.suppress_offline_events,
                    config.compress_wheel_events,
                ),
            }),
            data_available: Condvar::new(),
            write_free: Condvar::new(),
            attach_guard,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap()
    }
}

impl DeviceState {
    pub(crate) fn is_attached(&self) -> bool {
        self.lifecycle == LifecycleState::Attached
    }

    /// Cancel whatever is in flight, both directions. Called by the
    /// last close and by detach; callers hold the device mutex.
    pub(crate) fn abort_transfers(&mut self) {
        self.in_running = false;
        if let Some(transport) = self.transport.clone() {
            if let PumpState::Submitted(handle) = self.in_pump {
                transport.cancel(handle);
            }
            if let Some(handle) = self.slot.in_flight_handle() {
                transport.cancel(handle);
            }
        }
    }
}
