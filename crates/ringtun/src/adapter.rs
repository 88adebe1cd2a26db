//! Adapter handles.

use std::fmt;
use std::sync::Arc;

use ringtun_sys::{NativeDriver, RawAdapter, MAX_RING_CAPACITY, MIN_RING_CAPACITY};

use crate::error::{native_err, Error, Result};
use crate::session::Session;
use crate::util::encode_name;

/// Owns the native adapter handle. Shared between the public [`Adapter`]
/// and any sessions started on it, so the handle cannot be closed while a
/// session (or a pending async wait) is still alive.
pub(crate) struct AdapterInner {
    pub(crate) api: Arc<dyn NativeDriver>,
    pub(crate) raw: RawAdapter,
}

// SAFETY: the driver documents adapter handles as usable from any thread;
// the handle is only ever closed once, by Drop.
unsafe impl Send for AdapterInner {}
unsafe impl Sync for AdapterInner {}

impl Drop for AdapterInner {
    fn drop(&mut self) {
        // SAFETY: `raw` is the live handle this value owns; nothing can use
        // it after the last reference is gone.
        unsafe { self.api.close_adapter(self.raw) };
    }
}

/// A virtual network adapter.
///
/// Obtained from [`Driver::create_adapter`](crate::Driver::create_adapter)
/// or [`Driver::open_adapter`](crate::Driver::open_adapter). The native
/// resource is released exactly once, when the adapter and every session
/// started on it have been dropped.
pub struct Adapter {
    pub(crate) inner: Arc<AdapterInner>,
}

impl Adapter {
    pub(crate) fn create(
        api: Arc<dyn NativeDriver>,
        name: &str,
        tunnel_type: &str,
        guid: Option<u128>,
    ) -> Result<Self> {
        let name = encode_name(name, "adapter name")?;
        let tunnel_type = encode_name(tunnel_type, "tunnel type")?;
        let raw = api
            .create_adapter(&name, &tunnel_type, guid)
            .map_err(|e| native_err("create_adapter", e))?;
        Ok(Self {
            inner: Arc::new(AdapterInner { api, raw }),
        })
    }

    pub(crate) fn open(api: Arc<dyn NativeDriver>, name: &str) -> Result<Self> {
        let name = encode_name(name, "adapter name")?;
        let raw = api
            .open_adapter(&name)
            .map_err(|e| native_err("open_adapter", e))?;
        Ok(Self {
            inner: Arc::new(AdapterInner { api, raw }),
        })
    }

    /// The adapter's locally unique identifier, assigned by the driver.
    pub fn luid(&self) -> Luid {
        // SAFETY: `raw` is live for as long as `inner` is.
        Luid(unsafe { self.inner.api.adapter_luid(self.inner.raw) })
    }

    /// Start a packet session with the given ring capacity in bytes.
    ///
    /// `capacity` must be a power of two within
    /// [`MIN_RING_CAPACITY`]`..=`[`MAX_RING_CAPACITY`]; anything else is
    /// rejected before the native call.
    pub fn start_session(&self, capacity: u32) -> Result<Session> {
        if !capacity.is_power_of_two()
            || !(MIN_RING_CAPACITY..=MAX_RING_CAPACITY).contains(&capacity)
        {
            return Err(Error::InvalidArgument(format!(
                "ring capacity {capacity} is not a power of two in \
                 {MIN_RING_CAPACITY}..={MAX_RING_CAPACITY}"
            )));
        }
        Session::start(self.inner.clone(), capacity)
    }

    /// Close the adapter handle.
    ///
    /// Equivalent to dropping it; the explicit form exists for call sites
    /// that want the release visible. If sessions on this adapter are still
    /// alive, the native resource is released when the last of them ends.
    pub fn close(self) {
        drop(self);
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter").field("luid", &self.luid()).finish()
    }
}

/// Opaque 128-bit locally unique adapter identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Luid(pub(crate) u128);

impl Luid {
    pub fn as_u128(self) -> u128 {
        self.0
    }
}

impl From<Luid> for u128 {
    fn from(luid: Luid) -> u128 {
        luid.0
    }
}

impl fmt::Debug for Luid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Luid({:#x})", self.0)
    }
}

impl fmt::Display for Luid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
