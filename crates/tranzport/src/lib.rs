//! Host-side driver for the Frontier Tranzport USB control surface.
//!
//! The Tranzport exchanges fixed-size 8-byte reports over a pair of
//! interrupt endpoints. This crate presents a blocking read/write
//! session over that exchange while an always-armed inbound transfer
//! keeps a ring buffer of reports filled in the background, and while
//! the physical device can disappear at any moment.
//!
//! # Architecture
//!
//! ```text
//! hardware ──► inbound pump ──► ring buffer ──► DeviceSession::read()
//! DeviceSession::write() ──► write slot ──► outbound pump ──► hardware
//! ```
//!
//! Transfers are submitted through the [`transport::Transport`]
//! capability; completions come back as events on a channel and are
//! dispatched by a per-device thread owned by the [`lifecycle::Driver`].
//! The [`usb`] module provides the real rusb-backed transport, and
//! [`testing`] a scriptable in-memory one for tests.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod report;
pub mod session;
pub mod testing;
pub mod transport;
pub mod usb;

mod device;
mod filter;
mod pump;
mod ring;
mod slot;

pub use config::DriverConfig;
pub use error::{Error, Result};
pub use lifecycle::{Driver, LifecycleState};
pub use logging::setup_logging;
pub use report::{REPORT_LEN, Report};
pub use session::{Device, DeviceId, DeviceSession, Readiness, Wait};
pub use transport::{
    Completion, CompletionStatus, TransferHandle, Transport, TransportError,
};
