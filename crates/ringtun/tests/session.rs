//! Session protocol behavior against the loopback driver.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ringtun::{Driver, Error, LogLevel, MIN_RING_CAPACITY};
use ringtun_testkit::LoopbackDriver;

fn setup(name: &str) -> (LoopbackDriver, Driver, ringtun::Session, ringtun_testkit::LoopbackTap) {
    let loopback = LoopbackDriver::new();
    let driver = Driver::new(loopback.clone());
    let adapter = driver.create_adapter(name, "test", None).unwrap();
    let session = adapter.start_session(MIN_RING_CAPACITY).unwrap();
    let tap = loopback.tap(name).unwrap();
    (loopback, driver, session, tap)
}

#[test]
fn allocation_order_fixes_transmit_order_across_threads() {
    let (_loopback, _driver, session, tap) = setup("order");

    // Thread A allocates strictly before thread B (enforced by the channel
    // handoff), but B commits first. Transmit order must still be A, B.
    let (a_done, b_go) = mpsc::channel::<()>();
    let (b_done, a_go) = mpsc::channel::<()>();

    thread::scope(|scope| {
        let session_a = &session;
        scope.spawn(move || {
            let mut packet = session_a.allocate_send(4).unwrap().unwrap();
            packet.copy_from_slice(b"AAAA");
            a_done.send(()).unwrap();
            // Commit only after B has allocated and committed.
            a_go.recv().unwrap();
            packet.send();
        });

        let session_b = &session;
        scope.spawn(move || {
            b_go.recv().unwrap();
            let mut packet = session_b.allocate_send(4).unwrap().unwrap();
            packet.copy_from_slice(b"BBBB");
            packet.send();
            b_done.send(()).unwrap();
        });
    });

    let transmitted = tap.transmitted();
    assert_eq!(transmitted, vec![b"AAAA".to_vec(), b"BBBB".to_vec()]);
}

#[test]
fn committed_packet_waits_for_earlier_allocation() {
    let (_loopback, _driver, session, tap) = setup("holdback");

    let mut first = session.allocate_send(4).unwrap().unwrap();
    let mut second = session.allocate_send(4).unwrap().unwrap();
    second.copy_from_slice(b"2222");
    second.send();

    // Nothing may leave while the earlier slot is uncommitted.
    assert!(tap.transmitted().is_empty());

    first.copy_from_slice(b"1111");
    first.send();
    assert_eq!(tap.transmitted(), vec![b"1111".to_vec(), b"2222".to_vec()]);
}

#[test]
fn wait_wakes_on_empty_to_nonempty_transition() {
    let (_loopback, _driver, session, tap) = setup("wake");

    assert!(session.receive().unwrap().is_none());

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            assert!(tap.inject(b"wakeup"));
        });

        let start = Instant::now();
        let outcome = session.wait_for_read(Duration::from_secs(10)).unwrap();
        assert_eq!(outcome, ringtun::WaitOutcome::Ready);
        assert!(start.elapsed() < Duration::from_secs(5), "missed the signal");
    });

    let packet = session.receive().unwrap().expect("data after wakeup");
    assert_eq!(&*packet, b"wakeup");
}

#[test]
fn wait_never_returns_before_a_fractional_timeout() {
    let (_loopback, _driver, session, _tap) = setup("fraction");

    // Sub-millisecond remainders must round up, not truncate away.
    let timeout = Duration::from_micros(1500);
    let start = Instant::now();
    assert_eq!(
        session.wait_for_read(timeout).unwrap(),
        ringtun::WaitOutcome::TimedOut
    );
    let elapsed = start.elapsed();
    assert!(elapsed >= timeout, "returned early: {elapsed:?}");
}

#[test]
fn receive_release_may_happen_on_another_thread() {
    let (_loopback, _driver, session, tap) = setup("xthread");

    assert!(tap.inject(b"cross-thread"));
    let packet = session.receive().unwrap().unwrap();

    thread::scope(|scope| {
        scope.spawn(move || {
            assert_eq!(&*packet, b"cross-thread");
            packet.release();
        });
    });

    // The released quota is visible again.
    assert!(tap.inject(b"again"));
}

#[test]
fn dropped_send_view_leaks_its_slot_until_session_end() {
    let (_loopback, _driver, session, tap) = setup("leak");

    let max = ringtun::MAX_IP_PACKET_SIZE as usize;
    let abandoned = session.allocate_send(max).unwrap().unwrap();
    drop(abandoned);

    // The slot was never committed: nothing transmits, and its quota stays
    // taken, so a second max-size packet no longer fits the 128 KiB ring.
    assert!(tap.transmitted().is_empty());
    assert!(session.allocate_send(max).unwrap().is_none());
}

#[test]
fn guid_pins_the_adapter_luid() {
    let loopback = LoopbackDriver::new();
    let driver = Driver::new(loopback.clone());

    let pinned = driver
        .create_adapter("pinned", "test", Some(0xFEED_F00D))
        .unwrap();
    assert_eq!(pinned.luid().as_u128(), 0xFEED_F00D);

    let assigned = driver.create_adapter("assigned", "test", None).unwrap();
    assert_ne!(assigned.luid().as_u128(), 0);
}

#[test]
fn open_adapter_attaches_by_name() {
    let loopback = LoopbackDriver::new();
    let driver = Driver::new(loopback.clone());

    let created = driver.create_adapter("shared", "test", None).unwrap();
    let opened = driver.open_adapter("shared").unwrap();
    assert_eq!(created.luid(), opened.luid());

    match driver.open_adapter("missing") {
        Err(Error::NativeCallFailed { call, code }) => {
            assert_eq!(call, "open_adapter");
            assert_eq!(code, 2, "unknown adapter reports file-not-found");
        }
        other => panic!("expected NativeCallFailed, got {other:?}"),
    }
}

#[test]
fn running_version_formats_major_minor() {
    let driver = Driver::new(LoopbackDriver::new());
    let version = driver.running_version().unwrap();
    assert_eq!(version.to_string(), "0.1");
}

#[test]
fn driver_log_stream_reaches_the_installed_destination() {
    let loopback = LoopbackDriver::new();
    let driver = Driver::new(loopback.clone());

    let seen: Arc<Mutex<Vec<(LogLevel, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    driver.set_logger(move |level, _timestamp, message| {
        sink.lock().unwrap().push((level, message.to_owned()));
    });

    driver.create_adapter("logged", "test", None).unwrap();

    let seen = seen.lock().unwrap();
    assert!(
        seen.iter()
            .any(|(level, msg)| *level == LogLevel::Info && msg.contains("logged")),
        "expected an info message naming the adapter, got {seen:?}"
    );
    driver.clear_logger();
}

#[test]
fn session_keeps_adapter_alive_until_it_ends() {
    let (_loopback, driver, session, tap) = setup("lifetime");

    // The Adapter handle already went out of scope in setup; dropping the
    // Driver handle too must not invalidate the session.
    drop(driver);
    assert!(tap.inject(b"still-alive"));
    let packet = session.receive().unwrap().unwrap();
    assert_eq!(&*packet, b"still-alive");
    drop(packet);
    session.end();
}
