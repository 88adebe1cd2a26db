//! Caller-side precondition checks must reject bad arguments before any
//! native call. The `StrictDriver` backend panics the moment a guarded
//! operation reaches the boundary, so these tests fail loudly if
//! validation ever moves behind the call.

use std::ptr::NonNull;

use ringtun::{Driver, Error, MAX_RING_CAPACITY, MIN_RING_CAPACITY};
use ringtun::sys::{
    NativeDriver, RawAdapter, RawError, RawEvent, RawLogger, RawSession, WaitStatus,
};

/// A boundary that hands out dangling (never-dereferenced) handles and
/// panics on every operation the safe layer must have validated away.
struct StrictDriver;

fn dangling_adapter() -> RawAdapter {
    RawAdapter(NonNull::dangling())
}

fn dangling_session() -> RawSession {
    RawSession(NonNull::dangling())
}

// SAFETY: handles are never dereferenced; no packet pointers are ever
// produced, so no lease obligations arise.
unsafe impl NativeDriver for StrictDriver {
    fn create_adapter(
        &self,
        name: &[u16],
        tunnel_type: &[u16],
        _guid: Option<u128>,
    ) -> Result<RawAdapter, RawError> {
        assert!(name.len() <= 128, "over-long name crossed the boundary");
        assert!(
            tunnel_type.len() <= 128,
            "over-long tunnel type crossed the boundary"
        );
        Ok(dangling_adapter())
    }

    fn open_adapter(&self, name: &[u16]) -> Result<RawAdapter, RawError> {
        assert!(name.len() <= 128, "over-long name crossed the boundary");
        Ok(dangling_adapter())
    }

    unsafe fn close_adapter(&self, _adapter: RawAdapter) {}

    unsafe fn adapter_luid(&self, _adapter: RawAdapter) -> u128 {
        0
    }

    fn running_version(&self) -> Result<u32, RawError> {
        unreachable!("not under test")
    }

    fn delete_driver(&self) -> Result<bool, RawError> {
        unreachable!("not under test")
    }

    fn set_logger(&self, _logger: Option<RawLogger>) {}

    unsafe fn start_session(
        &self,
        _adapter: RawAdapter,
        capacity: u32,
    ) -> Result<RawSession, RawError> {
        assert!(
            capacity.is_power_of_two()
                && (MIN_RING_CAPACITY..=MAX_RING_CAPACITY).contains(&capacity),
            "invalid capacity {capacity} crossed the boundary"
        );
        Ok(dangling_session())
    }

    unsafe fn end_session(&self, _session: RawSession) {}

    unsafe fn read_wait_event(&self, _session: RawSession) -> RawEvent {
        RawEvent(std::ptr::null_mut())
    }

    unsafe fn receive_packet(
        &self,
        _session: RawSession,
    ) -> Result<(NonNull<u8>, u32), RawError> {
        unreachable!("not under test")
    }

    unsafe fn release_receive_packet(&self, _session: RawSession, _packet: NonNull<u8>) {
        unreachable!("not under test")
    }

    unsafe fn allocate_send_packet(
        &self,
        _session: RawSession,
        size: u32,
    ) -> Result<NonNull<u8>, RawError> {
        panic!("invalid size {size} crossed the boundary");
    }

    unsafe fn send_packet(&self, _session: RawSession, _packet: NonNull<u8>) {
        unreachable!("not under test")
    }

    unsafe fn wait_read(&self, _event: RawEvent, _timeout_ms: u32) -> WaitStatus {
        unreachable!("not under test")
    }
}

#[test]
fn valid_capacities_reach_the_driver() {
    let driver = Driver::new(StrictDriver);
    let adapter = driver.create_adapter("cap", "test", None).unwrap();
    for capacity in [
        MIN_RING_CAPACITY,
        MIN_RING_CAPACITY * 2,
        1 << 20,
        MAX_RING_CAPACITY,
    ] {
        adapter
            .start_session(capacity)
            .unwrap_or_else(|e| panic!("capacity {capacity} must be accepted: {e}"));
    }
}

#[test]
fn invalid_capacities_are_rejected_before_the_boundary() {
    let driver = Driver::new(StrictDriver);
    let adapter = driver.create_adapter("cap", "test", None).unwrap();
    for capacity in [
        0,
        1,
        MIN_RING_CAPACITY - 1,
        MIN_RING_CAPACITY / 2,
        MIN_RING_CAPACITY + MIN_RING_CAPACITY / 2, // in range, not a power of two
        MAX_RING_CAPACITY * 2,
        u32::MAX,
    ] {
        assert!(
            matches!(
                adapter.start_session(capacity),
                Err(Error::InvalidArgument(_))
            ),
            "capacity {capacity} must be rejected"
        );
    }
}

#[test]
fn packet_size_bounds_are_rejected_before_the_boundary() {
    let driver = Driver::new(StrictDriver);
    let adapter = driver.create_adapter("size", "test", None).unwrap();
    let session = adapter.start_session(MIN_RING_CAPACITY).unwrap();
    for size in [0usize, 65536, 1 << 20] {
        assert!(
            matches!(session.allocate_send(size), Err(Error::InvalidArgument(_))),
            "size {size} must be rejected"
        );
    }
}

#[test]
fn over_long_names_are_rejected_before_the_boundary() {
    let driver = Driver::new(StrictDriver);
    let long = "x".repeat(128);

    assert!(matches!(
        driver.create_adapter(&long, "test", None),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        driver.create_adapter("ok", &long, None),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        driver.open_adapter(&long),
        Err(Error::InvalidArgument(_))
    ));

    // 127 units is the documented limit and must pass.
    let max = "x".repeat(127);
    driver.create_adapter(&max, &max, None).unwrap();
}
