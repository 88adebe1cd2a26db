//! ringtun: safe handle-object binding for a ring-based virtual network
//! adapter driver.
//!
//! The driver exposes adapters (virtual network interfaces) and sessions
//! (a pair of lock-free packet rings per adapter) through a C ABI. This
//! crate wraps that boundary in owning handles with deterministic release,
//! typed errors, and borrowed packet views whose lifetimes enforce the ring
//! contract at compile time.
//!
//! # Quick start
//!
//! ```ignore
//! use std::time::Duration;
//! use ringtun::{Driver, WaitOutcome, MIN_RING_CAPACITY};
//!
//! let driver = Driver::load()?; // or Driver::new(some NativeDriver impl)
//! let adapter = driver.create_adapter("demo", "wireguard", None)?;
//! let session = adapter.start_session(MIN_RING_CAPACITY)?;
//!
//! loop {
//!     match session.receive()? {
//!         Some(packet) => handle(&packet), // released on drop
//!         None => {
//!             // Ring empty: park until data arrives or 500ms pass.
//!             if session.wait_for_read(Duration::from_millis(500))? == WaitOutcome::TimedOut {
//!                 continue;
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! Sending mirrors receiving: [`Session::allocate_send`] reserves a slot
//! (`None` means backpressure, retry later), the caller fills the bytes,
//! and [`SendPacket::send`] commits. Allocation-success order fixes
//! transmit order, even across threads.
//!
//! # Contract violations the types rule out
//!
//! - releasing or sending the same packet view twice (move semantics);
//! - using view bytes after release/send (borrow ends with the view);
//! - ending a session with views outstanding (views borrow the session);
//! - closing an adapter before its sessions end (sessions hold the
//!   adapter alive);
//! - double-closing any native handle (`Drop` runs once).

#![forbid(unsafe_op_in_unsafe_fn)]

mod adapter;
mod driver;
mod error;
mod logger;
mod packet;
mod session;
mod util;

pub use adapter::{Adapter, Luid};
pub use driver::{Driver, DriverVersion};
pub use error::{Error, Result};
pub use logger::filetime_to_system_time;
pub use packet::{RecvPacket, SendPacket};
pub use session::{Session, WaitHandle, WaitOutcome};

// The boundary contract, for implementing custom backends.
pub use ringtun_sys as sys;
pub use ringtun_sys::{
    LogLevel, MAX_IP_PACKET_SIZE, MAX_NAME_LEN, MAX_RING_CAPACITY, MIN_RING_CAPACITY,
};
