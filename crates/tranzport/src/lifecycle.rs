//! Attach/detach lifecycle management
//!
//! [`Driver`] tracks every attached device and arbitrates teardown.
//! Detach and open are serialized by a driver-wide guard so an open
//! cannot slip past the attached check while a detach is clearing the
//! transport handle. Final deallocation of a device record belongs to
//! whichever of {last close, detach} runs second; with the record
//! behind an `Arc` that rule is enforced by the reference count
//! rather than by hand.

use crate::config::DriverConfig;
use crate::device::DeviceShared;
use crate::pump;
use crate::session::{Device, DeviceId};
use crate::transport::Transport;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Where a device record is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Transport present, sessions may open.
    Attached,
    /// Teardown in progress: transfers being cancelled, transport
    /// about to be cleared.
    Detaching,
    /// Transport gone. Every session call observes `Disconnected`.
    Detached,
}

/// The driver instance: attach/detach protocol plus the registry of
/// attached devices.
pub struct Driver {
    config: DriverConfig,
    /// Serializes open() against detach() across all devices of this
    /// driver instance.
    attach_guard: Arc<Mutex<()>>,
    devices: Mutex<HashMap<DeviceId, Device>>,
    next_id: Mutex<u32>,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            attach_guard: Arc::new(Mutex::new(())),
            devices: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Bring a newly arrived device under driver control.
    ///
    /// Allocates the device record, spawns the completion dispatch
    /// thread consuming the transport's event stream, and registers
    /// the device. The thread exits when the transport closes its
    /// completion channel.
    pub fn attach(&self, transport: Arc<dyn Transport>) -> Device {
        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            let id = DeviceId(*next_id);
            *next_id += 1;
            id
        };

        let completions = transport.completions();
        let shared = Arc::new(DeviceShared::new(
            id,
            transport,
            Arc::clone(&self.attach_guard),
            &self.config,
        ));

        let dispatch_shared = Arc::clone(&shared);
        std::thread::Builder::new()
            .name(format!("tranzport-pump-{id}"))
            .spawn(move || {
                while let Ok(completion) = completions.recv_blocking() {
                    pump::dispatch(&dispatch_shared, completion);
                }
                debug!(device = %dispatch_shared.id, "completion stream closed");
            })
            .expect("failed to spawn completion dispatch thread");

        let device = Device::new(shared);
        self.devices.lock().unwrap().insert(id, device.clone());
        info!(device = %id, "device attached");
        device
    }

    /// Tear down an attached device, e.g. on physical removal.
    ///
    /// Cancels in-flight transfers and clears the transport handle so
    /// blocked and future session calls observe `Disconnected`. Open
    /// sessions keep their (now dead) handles; the record is freed
    /// when the last of them closes.
    pub fn detach(&self, id: DeviceId) -> bool {
        let Some(device) = self.devices.lock().unwrap().remove(&id) else {
            return false;
        };
        detach_device(device.shared());
        true
    }

    /// Look up an attached device.
    pub fn device(&self, id: DeviceId) -> Option<Device> {
        self.devices.lock().unwrap().get(&id).cloned()
    }

    /// Ids of all attached devices.
    pub fn devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.lock().unwrap().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        let devices: Vec<Device> = self.devices.lock().unwrap().drain().map(|(_, d)| d).collect();
        for device in devices {
            detach_device(device.shared());
        }
    }
}

fn detach_device(shared: &Arc<DeviceShared>) {
    // Hold the guard so no open() can pass its attached check while
    // the transport is being cleared.
    let _attach = shared.attach_guard.lock().unwrap();
    let mut state = shared.lock();
    if state.lifecycle != LifecycleState::Attached {
        return;
    }
    state.lifecycle = LifecycleState::Detaching;
    state.abort_transfers();
    state.transport = None;
    state.slot.reset();
    state.enabled = false;
    state.lifecycle = LifecycleState::Detached;
    let open_sessions = state.open_count;
    drop(state);

    // Unblock everyone; they will re-check and see the device gone.
    shared.data_available.notify_all();
    shared.write_free.notify_all();

    info!(device = %shared.id, open_sessions, "device detached");
}
