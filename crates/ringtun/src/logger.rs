//! Process-wide driver log routing.
//!
//! The native side holds at most one logger callback slot and offers no
//! unregistration primitive, so the binding registers a single stable
//! `extern "C"` dispatch function and swaps the actual destination behind
//! it. Replacement is last-writer-wins; clearing the destination leaves the
//! dispatch pointer registered and simply drops messages.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use ringtun_sys::{LogLevel, NativeDriver};

use crate::util::decode_wide;

pub(crate) type LoggerFn = dyn Fn(LogLevel, u64, &str) + Send + Sync;

static ACTIVE: RwLock<Option<Box<LoggerFn>>> = RwLock::new(None);

/// Seconds between 1601-01-01 and the Unix epoch.
const FILETIME_UNIX_OFFSET_SECS: u64 = 11_644_473_600;

/// The one function pointer the native side ever sees.
unsafe extern "C" fn dispatch(level: LogLevel, timestamp: u64, message: *const u16) {
    if message.is_null() {
        return;
    }
    // SAFETY: the driver passes a NUL-terminated UTF-16 string valid for the
    // duration of the call.
    let message = unsafe { decode_wide(message) };
    // Unwinding must not cross the C boundary.
    let _ = panic::catch_unwind(AssertUnwindSafe(|| {
        if let Some(callback) = ACTIVE.read().as_deref() {
            callback(level, timestamp, &message);
        }
    }));
}

/// Swap the current destination. Does not touch the native registration.
pub(crate) fn store(callback: Option<Box<LoggerFn>>) {
    *ACTIVE.write() = callback;
}

/// Install a destination and make sure the dispatch function is registered.
///
/// Registering repeatedly is harmless: the driver always ends up holding the
/// same pointer.
pub(crate) fn install(api: &Arc<dyn NativeDriver>, callback: Box<LoggerFn>) {
    store(Some(callback));
    api.set_logger(Some(dispatch));
}

/// A destination that forwards driver messages into `tracing` events.
pub(crate) fn tracing_destination() -> Box<LoggerFn> {
    Box::new(|level, timestamp, message| match level {
        LogLevel::Info => {
            tracing::info!(target: "ringtun::driver", timestamp, "{message}");
        }
        LogLevel::Warn => {
            tracing::warn!(target: "ringtun::driver", timestamp, "{message}");
        }
        LogLevel::Err => {
            tracing::error!(target: "ringtun::driver", timestamp, "{message}");
        }
    })
}

/// Convert a driver log timestamp (100 ns intervals since 1601-01-01 UTC)
/// to a [`SystemTime`].
pub fn filetime_to_system_time(timestamp_100ns: u64) -> SystemTime {
    let secs = timestamp_100ns / 10_000_000;
    let nanos = (timestamp_100ns % 10_000_000) as u32 * 100;
    UNIX_EPOCH - Duration::from_secs(FILETIME_UNIX_OFFSET_SECS) + Duration::new(secs, nanos)
}
