//! Lifecycle Integration Tests
//!
//! Attach/detach behavior: registry bookkeeping, transfer
//! cancellation, and how blocked sessions observe device loss.
//!
//! Run with: `cargo test -p tranzport --test lifecycle_tests`

use std::sync::Arc;
use std::thread;
use tranzport::testing::{DEFAULT_TEST_TIMEOUT, MockTransport, wait_for};
use tranzport::{Device, Driver, DriverConfig, Error, Report, Wait};

fn attach_mock(driver: &Driver) -> (Arc<MockTransport>, Device) {
    let mock = Arc::new(MockTransport::new());
    let device = driver.attach(mock.clone());
    (mock, device)
}

// ============================================================================
// Registry Tests
// ============================================================================

#[test]
fn test_attach_registers_devices() {
    let driver = Driver::new(DriverConfig::default());
    let (_mock_a, a) = attach_mock(&driver);
    let (_mock_b, b) = attach_mock(&driver);

    assert_ne!(a.id(), b.id());
    assert_eq!(driver.devices(), vec![a.id(), b.id()]);
    assert!(driver.device(a.id()).is_some());
}

#[test]
fn test_detach_removes_from_registry() {
    let driver = Driver::new(DriverConfig::default());
    let (_mock, device) = attach_mock(&driver);

    assert!(driver.detach(device.id()));
    assert!(driver.devices().is_empty());
    assert!(driver.device(device.id()).is_none());

    // Second detach is a no-op.
    assert!(!driver.detach(device.id()));
}

#[test]
fn test_detach_clears_attached_and_enabled() {
    let driver = Driver::new(DriverConfig::default());
    let (_mock, device) = attach_mock(&driver);
    assert!(device.is_attached());
    assert!(device.is_enabled());

    driver.detach(device.id());
    assert!(!device.is_attached());
    assert!(!device.is_enabled());
}

#[test]
fn test_driver_drop_detaches_everything() {
    let driver = Driver::new(DriverConfig::default());
    let (_mock, device) = attach_mock(&driver);
    drop(driver);
    assert!(!device.is_attached());
}

// ============================================================================
// Detach vs Open Sessions
// ============================================================================

#[test]
fn test_detach_cancels_inflight_receive() {
    let driver = Driver::new(DriverConfig::default());
    let (mock, device) = attach_mock(&driver);
    let _session = device.open().unwrap();
    assert!(wait_for(DEFAULT_TEST_TIMEOUT, || mock.pending_in() == 1));

    driver.detach(device.id());
    assert!(wait_for(DEFAULT_TEST_TIMEOUT, || !mock.cancelled().is_empty()));
    assert_eq!(mock.pending_in(), 0);
}

#[test]
fn test_open_after_detach_fails() {
    let driver = Driver::new(DriverConfig::default());
    let (_mock, device) = attach_mock(&driver);
    driver.detach(device.id());

    assert_eq!(device.open().err(), Some(Error::Disconnected));
}

#[test]
fn test_detach_unblocks_reader() {
    let driver = Driver::new(DriverConfig::default());
    let (_mock, device) = attach_mock(&driver);
    let session = device.open().unwrap();

    let reader = thread::spawn(move || session.read(Wait::Blocking));
    // Give the reader a moment to actually block.
    thread::sleep(std::time::Duration::from_millis(20));

    driver.detach(device.id());
    assert_eq!(reader.join().unwrap(), Err(Error::Disconnected));
}

#[test]
fn test_detach_unblocks_awaiting_writer() {
    let driver = Driver::new(DriverConfig::default());
    let (mock, device) = attach_mock(&driver);
    let session = device.open().unwrap();

    let report = Report::from([0, 0, 1, 0, 0, 0, 0, 0]);
    let writer = thread::spawn(move || session.write(report, Wait::Blocking));
    assert!(wait_for(DEFAULT_TEST_TIMEOUT, || mock.pending_out() == 1));

    driver.detach(device.id());
    assert_eq!(writer.join().unwrap(), Err(Error::Disconnected));
}

#[test]
fn test_detach_unblocks_writer_waiting_for_slot() {
    let driver = Driver::new(DriverConfig::default());
    let (_mock, device) = attach_mock(&driver);
    let first = device.open().unwrap();
    let second = device.open().unwrap();

    let report = Report::from([0, 0, 1, 0, 0, 0, 0, 0]);
    first.write(report, Wait::NonBlocking).unwrap();

    let writer = thread::spawn(move || second.write(report, Wait::Blocking));
    thread::sleep(std::time::Duration::from_millis(20));

    driver.detach(device.id());
    assert_eq!(writer.join().unwrap(), Err(Error::Disconnected));
}

#[test]
fn test_queued_reports_drain_after_detach() {
    let driver = Driver::new(DriverConfig::default());
    let (mock, device) = attach_mock(&driver);
    let session = device.open().unwrap();

    let report = [0, 0, 5, 0, 0, 0, 0, 0];
    assert!(wait_for(DEFAULT_TEST_TIMEOUT, || mock.pending_in() == 1));
    assert!(mock.deliver(report));
    assert!(wait_for(DEFAULT_TEST_TIMEOUT, || session.poll().readable));

    driver.detach(device.id());

    // Already-queued data is still readable; after that the loss shows.
    assert_eq!(session.read(Wait::NonBlocking).unwrap(), Report::from(report));
    assert_eq!(session.read(Wait::NonBlocking), Err(Error::Disconnected));
}

#[test]
fn test_session_calls_after_detach_fail_fast() {
    let driver = Driver::new(DriverConfig::default());
    let (_mock, device) = attach_mock(&driver);
    let session = device.open().unwrap();

    driver.detach(device.id());

    assert_eq!(session.read(Wait::Blocking), Err(Error::Disconnected));
    let report = Report::from([0, 0, 1, 0, 0, 0, 0, 0]);
    assert_eq!(session.write(report, Wait::Blocking), Err(Error::Disconnected));

    let readiness = session.poll();
    assert!(readiness.readable);

    // Closing the last session after detach must not blow up; the
    // record is freed when the final reference drops.
    session.close();
}

#[test]
fn test_transport_shutdown_stops_pump() {
    let driver = Driver::new(DriverConfig::default());
    let (mock, device) = attach_mock(&driver);
    let session = device.open().unwrap();
    assert!(wait_for(DEFAULT_TEST_TIMEOUT, || mock.pending_in() == 1));

    // Device fell off the bus: the backend reports shutdown.
    use tranzport::CompletionStatus;
    assert!(mock.complete_next_in(CompletionStatus::Shutdown, &[]));

    let result = session.read(Wait::Timeout(DEFAULT_TEST_TIMEOUT));
    assert_eq!(result, Err(Error::Disconnected));
}
