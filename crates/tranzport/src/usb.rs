//! rusb-backed transport
//!
//! libusb's synchronous API has no completion callbacks, so a worker
//! thread owns the device handle and turns submissions into
//! completion events. Inbound transfers stay armed by polling
//! `read_interrupt` with a short timeout; a timeout just means the
//! device had nothing to say and the receive stays pending.

use crate::config::DriverConfig;
use crate::transport::{
    Completion, CompletionStatus, TransferHandle, Transport, TransportError,
};
use async_channel::{Receiver, Sender, TryRecvError, unbounded};
use rusb::{Context, Device as RusbDevice, DeviceHandle, UsbContext};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Frontier Design Group.
pub const VENDOR_ID: u16 = 0x165b;
/// Tranzport control surface.
pub const PRODUCT_ID: u16 = 0x8101;

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(1);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure to open a USB device as a transport.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("no matching USB device found")]
    NotFound,
    #[error("device has no interrupt in/out endpoint pair")]
    NoInterruptEndpoints,
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

/// One matching device found during enumeration.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub bus_number: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// List connected devices matching `vendor_id`/`product_id`.
pub fn enumerate(vendor_id: u16, product_id: u16) -> Result<Vec<DiscoveredDevice>, rusb::Error> {
    let context = Context::new()?;
    let mut found = Vec::new();
    for device in context.devices()?.iter() {
        let Ok(descriptor) = device.device_descriptor() else {
            continue;
        };
        if descriptor.vendor_id() != vendor_id || descriptor.product_id() != product_id {
            continue;
        }
        found.push(DiscoveredDevice {
            bus_number: device.bus_number(),
            address: device.address(),
            vendor_id,
            product_id,
        });
    }
    Ok(found)
}

enum WorkerCommand {
    SubmitIn { handle: TransferHandle, len: usize },
    SubmitOut { handle: TransferHandle, data: Vec<u8> },
    Shutdown,
}

/// [`Transport`] over a claimed USB interface.
pub struct UsbTransport {
    command_tx: Sender<WorkerCommand>,
    completion_rx: Receiver<Completion>,
    cancelled: Arc<Mutex<HashSet<TransferHandle>>>,
    next_handle: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl UsbTransport {
    /// Open the first connected device matching `vendor_id`/`product_id`.
    pub fn open_first(
        vendor_id: u16,
        product_id: u16,
        config: &DriverConfig,
    ) -> Result<Self, OpenError> {
        let context = Context::new()?;
        for device in context.devices()?.iter() {
            let Ok(descriptor) = device.device_descriptor() else {
                continue;
            };
            if descriptor.vendor_id() == vendor_id && descriptor.product_id() == product_id {
                return Self::open_device(&device, config);
            }
        }
        Err(OpenError::NotFound)
    }

    fn open_device(device: &RusbDevice<Context>, config: &DriverConfig) -> Result<Self, OpenError> {
        let endpoints = find_interrupt_endpoints(device)?;
        let handle = device.open()?;

        match handle.kernel_driver_active(endpoints.interface) {
            Ok(true) => {
                debug!(interface = endpoints.interface, "detaching kernel driver");
                handle.detach_kernel_driver(endpoints.interface)?;
            }
            Ok(false) => {}
            // Not supported on all platforms; claiming will tell us.
            Err(e) => debug!("kernel_driver_active: {e}"),
        }
        handle.claim_interface(endpoints.interface)?;

        debug!(
            bus = device.bus_number(),
            address = device.address(),
            in_endpoint = endpoints.in_address,
            out_endpoint = endpoints.out_address,
            "USB device opened"
        );

        let (command_tx, command_rx) = unbounded();
        let (completion_tx, completion_rx) = unbounded();
        let cancelled = Arc::new(Mutex::new(HashSet::new()));

        let worker = UsbWorker {
            handle,
            endpoints,
            read_timeout: Duration::from_millis(config.interrupt_in_interval_ms.max(1)),
            command_rx,
            completion_tx,
            cancelled: Arc::clone(&cancelled),
        };
        let join = std::thread::Builder::new()
            .name("tranzport-usb".to_string())
            .spawn(move || worker.run())
            .map_err(|e| {
                warn!("failed to spawn USB worker thread: {e}");
                OpenError::Usb(rusb::Error::Other)
            })?;

        Ok(Self {
            command_tx,
            completion_rx,
            cancelled,
            next_handle: AtomicU64::new(1),
            worker: Mutex::new(Some(join)),
        })
    }

    fn allocate_handle(&self) -> TransferHandle {
        TransferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn send_command(&self, command: WorkerCommand) -> Result<(), TransportError> {
        // The queue is unbounded; a send only fails once the worker
        // has shut down.
        self.command_tx
            .try_send(command)
            .map_err(|_| TransportError::NoDevice)
    }
}

impl Transport for UsbTransport {
    fn submit_in(&self, len: usize) -> Result<TransferHandle, TransportError> {
        let handle = self.allocate_handle();
        self.send_command(WorkerCommand::SubmitIn { handle, len })?;
        Ok(handle)
    }

    fn submit_out(&self, data: &[u8]) -> Result<TransferHandle, TransportError> {
        let handle = self.allocate_handle();
        self.send_command(WorkerCommand::SubmitOut {
            handle,
            data: data.to_vec(),
        })?;
        Ok(handle)
    }

    fn cancel(&self, handle: TransferHandle) {
        self.cancelled.lock().unwrap().insert(handle);
    }

    fn completions(&self) -> Receiver<Completion> {
        self.completion_rx.clone()
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        let _ = self.command_tx.try_send(WorkerCommand::Shutdown);
        self.command_tx.close();
        if let Some(join) = self.worker.lock().unwrap().take() {
            let _ = join.join();
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct InterruptEndpoints {
    interface: u8,
    in_address: u8,
    out_address: u8,
}

fn find_interrupt_endpoints(device: &RusbDevice<Context>) -> Result<InterruptEndpoints, OpenError> {
    let config = device.active_config_descriptor()?;
    for interface in config.interfaces() {
        for descriptor in interface.descriptors() {
            let mut in_address = None;
            let mut out_address = None;
            for endpoint in descriptor.endpoint_descriptors() {
                if endpoint.transfer_type() != rusb::TransferType::Interrupt {
                    continue;
                }
                match endpoint.direction() {
                    rusb::Direction::In => in_address = Some(endpoint.address()),
                    rusb::Direction::Out => out_address = Some(endpoint.address()),
                }
            }
            if let (Some(in_address), Some(out_address)) = (in_address, out_address) {
                return Ok(InterruptEndpoints {
                    interface: descriptor.interface_number(),
                    in_address,
                    out_address,
                });
            }
        }
    }
    Err(OpenError::NoInterruptEndpoints)
}

struct UsbWorker {
    handle: DeviceHandle<Context>,
    endpoints: InterruptEndpoints,
    read_timeout: Duration,
    command_rx: Receiver<WorkerCommand>,
    completion_tx: Sender<Completion>,
    cancelled: Arc<Mutex<HashSet<TransferHandle>>>,
}

impl UsbWorker {
    fn run(mut self) {
        debug!("USB worker started");
        // At most one inbound transfer is armed at a time; the core
        // resubmits after each completion.
        let mut pending_in: Option<(TransferHandle, usize)> = None;
        let mut device_gone = false;

        'outer: while !device_gone {
            loop {
                match self.command_rx.try_recv() {
                    Ok(WorkerCommand::Shutdown) => break 'outer,
                    Ok(WorkerCommand::SubmitIn { handle, len }) => {
                        pending_in = Some((handle, len));
                    }
                    Ok(WorkerCommand::SubmitOut { handle, data }) => {
                        device_gone |= self.perform_out(handle, &data);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Closed) => break 'outer,
                }
            }

            match pending_in {
                Some((handle, len)) => {
                    if self.take_cancelled(handle) {
                        self.emit_in(handle, CompletionStatus::Cancelled, Vec::new());
                        pending_in = None;
                    } else if let Some(gone) = self.poll_in(handle, len) {
                        device_gone |= gone;
                        pending_in = None;
                    }
                }
                None => std::thread::sleep(IDLE_POLL_INTERVAL),
            }
        }

        if let Some((handle, _)) = pending_in {
            self.emit_in(handle, CompletionStatus::Shutdown, Vec::new());
        }
        if let Err(e) = self.handle.release_interface(self.endpoints.interface) {
            debug!("release_interface: {e}");
        }
        if let Err(e) = self.handle.attach_kernel_driver(self.endpoints.interface) {
            debug!("attach_kernel_driver: {e}");
        }
        debug!("USB worker stopped");
        // Dropping completion_tx closes the channel and ends the
        // device's dispatch thread.
    }

    /// `Some(gone)` when the transfer finished, `None` while it stays
    /// pending.
    fn poll_in(&mut self, handle: TransferHandle, len: usize) -> Option<bool> {
        let mut buffer = vec![0u8; len];
        match self
            .handle
            .read_interrupt(self.endpoints.in_address, &mut buffer, self.read_timeout)
        {
            Ok(n) => {
                buffer.truncate(n);
                self.emit_in(handle, CompletionStatus::Success, buffer);
                Some(false)
            }
            // Nothing to report yet; the receive stays armed.
            Err(rusb::Error::Timeout) => None,
            Err(rusb::Error::NoDevice) => {
                self.emit_in(handle, CompletionStatus::Shutdown, Vec::new());
                Some(true)
            }
            Err(e) => {
                self.emit_in(handle, CompletionStatus::Error(map_rusb_error(e)), Vec::new());
                Some(false)
            }
        }
    }

    /// Returns true when the device is gone.
    fn perform_out(&mut self, handle: TransferHandle, data: &[u8]) -> bool {
        if self.take_cancelled(handle) {
            self.emit_out(handle, CompletionStatus::Cancelled);
            return false;
        }
        match self
            .handle
            .write_interrupt(self.endpoints.out_address, data, WRITE_TIMEOUT)
        {
            Ok(_) => {
                self.emit_out(handle, CompletionStatus::Success);
                false
            }
            Err(rusb::Error::NoDevice) => {
                self.emit_out(handle, CompletionStatus::Shutdown);
                true
            }
            Err(e) => {
                self.emit_out(handle, CompletionStatus::Error(map_rusb_error(e)));
                false
            }
        }
    }

    fn take_cancelled(&self, handle: TransferHandle) -> bool {
        self.cancelled.lock().unwrap().remove(&handle)
    }

    fn emit_in(&self, handle: TransferHandle, status: CompletionStatus, data: Vec<u8>) {
        let _ = self
            .completion_tx
            .send_blocking(Completion::In { handle, status, data });
    }

    fn emit_out(&self, handle: TransferHandle, status: CompletionStatus) {
        let _ = self
            .completion_tx
            .send_blocking(Completion::Out { handle, status });
    }
}

fn map_rusb_error(error: rusb::Error) -> TransportError {
    match error {
        rusb::Error::Timeout => TransportError::Timeout,
        rusb::Error::Pipe => TransportError::Pipe,
        rusb::Error::NoDevice => TransportError::NoDevice,
        rusb::Error::NotFound => TransportError::NotFound,
        rusb::Error::Busy => TransportError::Busy,
        rusb::Error::Overflow => TransportError::Overflow,
        rusb::Error::InvalidParam => TransportError::InvalidParam,
        rusb::Error::Access => TransportError::Access,
        _ => TransportError::Io,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert_eq!(map_rusb_error(rusb::Error::Timeout), TransportError::Timeout);
        assert_eq!(map_rusb_error(rusb::Error::Pipe), TransportError::Pipe);
        assert_eq!(map_rusb_error(rusb::Error::NoDevice), TransportError::NoDevice);
        assert_eq!(map_rusb_error(rusb::Error::Access), TransportError::Access);
        assert_eq!(map_rusb_error(rusb::Error::Interrupted), TransportError::Io);
    }

    #[test]
    fn test_enumerate_tolerates_missing_hardware() {
        // No Tranzport on CI; only check that enumeration itself does
        // not fall over when libusb is available.
        match enumerate(VENDOR_ID, PRODUCT_ID) {
            Ok(devices) => {
                for d in devices {
                    assert_eq!(d.vendor_id, VENDOR_ID);
                    assert_eq!(d.product_id, PRODUCT_ID);
                }
            }
            Err(e) => eprintln!("USB enumeration unavailable: {e}"),
        }
    }
}
