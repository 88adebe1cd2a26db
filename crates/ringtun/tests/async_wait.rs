//! Awaitable wait-for-read (feature `async`).

use std::time::{Duration, Instant};

use ringtun::{Driver, WaitOutcome, MIN_RING_CAPACITY};
use ringtun_testkit::LoopbackDriver;

#[tokio::test(flavor = "multi_thread")]
async fn async_wait_times_out() {
    let loopback = LoopbackDriver::new();
    let driver = Driver::new(loopback.clone());
    let adapter = driver.create_adapter("async-timeout", "test", None).unwrap();
    let session = adapter.start_session(MIN_RING_CAPACITY).unwrap();

    let start = Instant::now();
    let outcome = session
        .wait_for_read_async(Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test(flavor = "multi_thread")]
async fn async_wait_wakes_on_inject() {
    let loopback = LoopbackDriver::new();
    let driver = Driver::new(loopback.clone());
    let adapter = driver.create_adapter("async-wake", "test", None).unwrap();
    let session = adapter.start_session(MIN_RING_CAPACITY).unwrap();
    let tap = loopback.tap("async-wake").unwrap();

    let injector = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(tap.inject(b"async-wakeup"));
    });

    let outcome = session
        .wait_for_read_async(Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(outcome, WaitOutcome::Ready);

    let packet = session.receive().unwrap().expect("data after wakeup");
    assert_eq!(&*packet, b"async-wakeup");
    injector.await.unwrap();
}
