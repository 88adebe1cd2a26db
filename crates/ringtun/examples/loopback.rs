//! Echo demo over the in-process loopback driver.
//!
//! Injects packets on the network side, receives them through a session,
//! and sends an uppercased copy back out, printing what the "network"
//! captures.
//!
//! Run with: `cargo run -p ringtun --example loopback`

use std::time::Duration;

use ringtun::{Driver, WaitOutcome, MIN_RING_CAPACITY};
use ringtun_testkit::LoopbackDriver;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let loopback = LoopbackDriver::new();
    let driver = Driver::new(loopback.clone());
    driver.route_logs_to_tracing();

    let adapter = driver.create_adapter("demo", "loopback", None)?;
    tracing::info!(luid = %adapter.luid(), "adapter up");

    let session = adapter.start_session(MIN_RING_CAPACITY)?;
    let tap = loopback.tap("demo").expect("tap for created adapter");

    // The network side delivers three packets.
    for payload in [&b"ping one"[..], b"ping two", b"ping three"] {
        assert!(tap.inject(payload));
    }

    // Drain the receive ring, echoing each packet uppercased.
    loop {
        match session.receive()? {
            Some(packet) => {
                tracing::info!(len = packet.len(), "received {:?}", String::from_utf8_lossy(&packet));
                let mut reply = session
                    .allocate_send(packet.len())?
                    .expect("send ring has space");
                reply.copy_from_slice(&packet);
                reply.make_ascii_uppercase();
                reply.send();
            }
            None => {
                // Ring drained; one short wait to show the timeout path.
                match session.wait_for_read(Duration::from_millis(100))? {
                    WaitOutcome::Ready => continue,
                    WaitOutcome::TimedOut => break,
                }
            }
        }
    }

    for echoed in tap.transmitted() {
        println!("network captured: {:?}", String::from_utf8_lossy(&echoed));
    }

    Ok(())
}
