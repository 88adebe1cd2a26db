//! Wide-string handling for names crossing the native boundary.

use ringtun_sys::MAX_NAME_LEN;

use crate::error::{Error, Result};

/// Encode a name as NUL-terminated UTF-16, enforcing the driver's length
/// limit before any native call.
pub(crate) fn encode_name(value: &str, what: &str) -> Result<Vec<u16>> {
    let mut units = Vec::with_capacity(value.len() + 1);
    for unit in value.encode_utf16() {
        if unit == 0 {
            return Err(Error::InvalidArgument(format!(
                "{what} contains an embedded NUL"
            )));
        }
        units.push(unit);
    }
    if units.len() > MAX_NAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "{what} is {} UTF-16 units long, limit is {MAX_NAME_LEN}",
            units.len()
        )));
    }
    units.push(0);
    Ok(units)
}

/// Decode a NUL-terminated UTF-16 string, lossily.
pub(crate) unsafe fn decode_wide(mut ptr: *const u16) -> String {
    let mut units = Vec::new();
    // SAFETY: caller guarantees `ptr` points at a NUL-terminated string.
    unsafe {
        while *ptr != 0 {
            units.push(*ptr);
            ptr = ptr.add(1);
        }
    }
    String::from_utf16_lossy(&units)
}
