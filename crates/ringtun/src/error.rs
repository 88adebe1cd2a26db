//! Error taxonomy and status-code translation.
//!
//! Expected outcomes are never errors: an empty receive ring, a full send
//! ring, and a wait timeout all come back through `Option` / `WaitOutcome`
//! in the operation signatures. Everything here is either a caller-side
//! precondition violation or a genuine driver failure.

use ringtun_sys::{RawError, STATUS_HANDLE_EOF, STATUS_INVALID_DATA};
use thiserror::Error;

/// Errors surfaced by the binding.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-side precondition was violated; no native call was made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The native boundary returned a failure status with no more specific
    /// meaning. Carries the driver's status code for diagnostics.
    #[error("native call {call} failed with status {code}")]
    NativeCallFailed { call: &'static str, code: u32 },

    /// The adapter or session is shutting down. Stop operating on the
    /// session rather than retrying.
    #[error("adapter is terminating")]
    AdapterTerminating,

    /// The driver detected consistency damage in ring memory. The session
    /// is unusable and should be torn down.
    #[error("session ring buffer is corrupt")]
    CorruptRingBuffer,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Translate a failed non-session boundary call.
pub(crate) fn native_err(call: &'static str, e: RawError) -> Error {
    Error::NativeCallFailed { call, code: e.code }
}

/// Translate a failed session operation, distinguishing the two fatal
/// statuses the driver defines for the packet paths.
pub(crate) fn session_err(call: &'static str, e: RawError) -> Error {
    match e.code {
        STATUS_HANDLE_EOF => Error::AdapterTerminating,
        STATUS_INVALID_DATA => Error::CorruptRingBuffer,
        code => Error::NativeCallFailed { call, code },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringtun_sys::STATUS_NO_MORE_ITEMS;

    #[test]
    fn session_translation_distinguishes_fatal_codes() {
        assert!(matches!(
            session_err("receive_packet", RawError::new(STATUS_HANDLE_EOF)),
            Error::AdapterTerminating
        ));
        assert!(matches!(
            session_err("receive_packet", RawError::new(STATUS_INVALID_DATA)),
            Error::CorruptRingBuffer
        ));
        assert!(matches!(
            session_err("receive_packet", RawError::new(STATUS_NO_MORE_ITEMS)),
            Error::NativeCallFailed { code: STATUS_NO_MORE_ITEMS, .. }
        ));
    }
}
