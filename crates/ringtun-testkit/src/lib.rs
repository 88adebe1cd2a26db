//! ringtun-testkit: in-process reference driver and conformance scenarios.
//!
//! [`LoopbackDriver`] implements the full `NativeDriver` boundary in memory
//! with real ring accounting, so the safe layer and its contract can be
//! tested without the kernel driver. [`LoopbackTap`] plays the
//! network side: it injects inbound packets, captures transmitted ones, and
//! triggers the terminating / corrupt-ring fault paths.
//!
//! # Usage
//!
//! ```ignore
//! use ringtun::Driver;
//! use ringtun_testkit::LoopbackDriver;
//!
//! let loopback = LoopbackDriver::new();
//! let driver = Driver::new(loopback.clone());
//! let adapter = driver.create_adapter("test", "testkit", None)?;
//! let session = adapter.start_session(ringtun::MIN_RING_CAPACITY)?;
//! let tap = loopback.tap("test").unwrap();
//!
//! tap.inject(b"inbound packet");
//! let packet = session.receive()?.unwrap();
//! ```
//!
//! The [`scenarios`] module holds the shared conformance suite.

mod event;
mod loopback;
pub mod scenarios;

pub use event::Event;
pub use loopback::{filetime_now, LoopbackDriver, LoopbackTap};
