//! Shared conformance scenarios for the session protocol.
//!
//! Each scenario builds its own adapter and session over a caller-supplied
//! loopback driver and panics on contract violations, so test crates can
//! re-run the whole suite with one line per scenario.

use std::time::{Duration, Instant};

use ringtun::{Driver, Error, Session, WaitOutcome, MIN_RING_CAPACITY};

use crate::{LoopbackDriver, LoopbackTap};

fn setup(loopback: &LoopbackDriver, name: &str) -> (Session, LoopbackTap) {
    let driver = Driver::new(loopback.clone());
    let adapter = driver
        .create_adapter(name, "testkit", None)
        .expect("create adapter");
    let session = adapter
        .start_session(MIN_RING_CAPACITY)
        .expect("start session");
    let tap = loopback.tap(name).expect("tap for created adapter");
    (session, tap)
}

/// Inject a packet, receive it, check its bytes, release, and verify the
/// quota came back by filling the ring again.
pub fn run_receive_round_trip(loopback: &LoopbackDriver) {
    let (session, tap) = setup(loopback, "conf-recv");

    assert!(tap.inject(b"\x45hello-inbound"));
    let packet = session
        .receive()
        .expect("receive")
        .expect("packet must be ready after inject");
    assert_eq!(&*packet, b"\x45hello-inbound");
    packet.release();

    assert!(tap.inject(b"second"), "released slot must free ring quota");
    let packet = session.receive().expect("receive").expect("second packet");
    assert_eq!(&*packet, b"second");
}

/// Allocate, fill, commit, and observe the exact bytes on the capture side.
pub fn run_send_round_trip(loopback: &LoopbackDriver) {
    let (session, tap) = setup(loopback, "conf-send");

    let payload = [0xABu8; 1280];
    let mut packet = session
        .allocate_send(payload.len())
        .expect("allocate")
        .expect("empty ring must have space");
    assert_eq!(packet.len(), payload.len());
    packet.copy_from_slice(&payload);
    packet.send();

    let transmitted = tap.transmitted();
    assert_eq!(transmitted.len(), 1);
    assert_eq!(transmitted[0], payload, "no truncation or padding");
}

/// An empty receive ring is a normal outcome, not an error.
pub fn run_empty_receive(loopback: &LoopbackDriver) {
    let (session, _tap) = setup(loopback, "conf-empty");
    assert!(session.receive().expect("receive").is_none());
}

/// Fill the send ring until it reports backpressure, drain it, and verify
/// allocation works again.
pub fn run_backpressure_then_drain(loopback: &LoopbackDriver) {
    let (session, tap) = setup(loopback, "conf-full");

    let mut held = Vec::new();
    loop {
        match session.allocate_send(ringtun::MAX_IP_PACKET_SIZE as usize) {
            Ok(Some(packet)) => held.push(packet),
            Ok(None) => break,
            Err(e) => panic!("ring-full must not be an error: {e}"),
        }
        assert!(held.len() < 1024, "ring never reported full");
    }
    assert!(!held.is_empty(), "at least one max-size packet must fit");

    let committed = held.len();
    for packet in held {
        packet.send();
    }
    assert_eq!(tap.transmitted().len(), committed);

    assert!(
        session
            .allocate_send(64)
            .expect("allocate after drain")
            .is_some(),
        "drained ring must accept new allocations"
    );
}

/// Once the session starts terminating, both packet paths surface the
/// terminating error and the wait handle is permanently signaled.
pub fn run_terminating_surfaces(loopback: &LoopbackDriver) {
    let (session, tap) = setup(loopback, "conf-term");
    tap.begin_teardown();

    assert!(matches!(session.receive(), Err(Error::AdapterTerminating)));
    assert!(matches!(
        session.allocate_send(64),
        Err(Error::AdapterTerminating)
    ));
    assert_eq!(
        session
            .wait_for_read(Duration::from_millis(10))
            .expect("wait"),
        WaitOutcome::Ready
    );
}

/// A corrupt receive ring is fatal to the session.
pub fn run_corrupt_ring_surfaces(loopback: &LoopbackDriver) {
    let (session, tap) = setup(loopback, "conf-corrupt");
    tap.corrupt_receive_ring();
    assert!(matches!(session.receive(), Err(Error::CorruptRingBuffer)));
}

/// With nothing inbound, a timed wait returns control at or after the
/// timeout, within a bounded overshoot.
pub fn run_wait_timeout(loopback: &LoopbackDriver, timeout: Duration) {
    let (session, _tap) = setup(loopback, "conf-wait");

    assert!(session.receive().expect("receive").is_none());
    let start = Instant::now();
    assert_eq!(
        session.wait_for_read(timeout).expect("wait"),
        WaitOutcome::TimedOut
    );
    let elapsed = start.elapsed();
    assert!(elapsed >= timeout, "returned early: {elapsed:?}");
    assert!(
        elapsed < timeout + Duration::from_secs(2),
        "overshoot too large: {elapsed:?}"
    );
}
