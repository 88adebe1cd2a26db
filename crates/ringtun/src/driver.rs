//! The driver handle: entry point for everything else.

use std::fmt;
use std::sync::Arc;

use ringtun_sys::{LogLevel, NativeDriver};

use crate::adapter::Adapter;
use crate::error::{native_err, Result};
use crate::logger;

/// Handle to a loaded native driver.
///
/// Cheap to clone; all adapters and sessions created through it share the
/// same boundary implementation.
#[derive(Clone)]
pub struct Driver {
    api: Arc<dyn NativeDriver>,
}

impl Driver {
    /// Wrap any boundary implementation (the Windows DLL backend, or the
    /// testkit's loopback driver).
    pub fn new(api: impl NativeDriver) -> Self {
        Self { api: Arc::new(api) }
    }

    /// Load the native user-mode library from the default search path.
    #[cfg(windows)]
    pub fn load() -> std::io::Result<Self> {
        Ok(Self::new(ringtun_sys::WintunDll::load()?))
    }

    /// Version of the running kernel driver.
    ///
    /// Fails with `NativeCallFailed { code: 2, .. }` (file not found) when
    /// the driver is not currently loaded.
    pub fn running_version(&self) -> Result<DriverVersion> {
        self.api
            .running_version()
            .map(DriverVersion)
            .map_err(|e| native_err("get_running_driver_version", e))
    }

    /// Ask the driver to remove itself once no adapters remain.
    pub fn delete(&self) -> Result<bool> {
        self.api
            .delete_driver()
            .map_err(|e| native_err("delete_driver", e))
    }

    /// Create a new adapter.
    ///
    /// `name` and `tunnel_type` are limited to 127 UTF-16 code units each;
    /// violations are rejected before any native call. `guid` optionally
    /// pins the adapter's identity across recreations.
    pub fn create_adapter(
        &self,
        name: &str,
        tunnel_type: &str,
        guid: Option<u128>,
    ) -> Result<Adapter> {
        Adapter::create(self.api.clone(), name, tunnel_type, guid)
    }

    /// Attach to an existing adapter by name.
    pub fn open_adapter(&self, name: &str) -> Result<Adapter> {
        Adapter::open(self.api.clone(), name)
    }

    /// Install a destination for the driver's own log stream.
    ///
    /// The slot is process-wide and last-writer-wins: the native side keeps
    /// exactly one stable dispatch pointer for the process lifetime, and
    /// this call only swaps where dispatched messages go. `timestamp` is in
    /// 100 ns intervals since 1601-01-01 UTC; see
    /// [`filetime_to_system_time`](crate::filetime_to_system_time).
    pub fn set_logger<F>(&self, callback: F)
    where
        F: Fn(LogLevel, u64, &str) + Send + Sync + 'static,
    {
        logger::install(&self.api, Box::new(callback));
    }

    /// Forward the driver's log stream into `tracing` events
    /// (target `ringtun::driver`).
    pub fn route_logs_to_tracing(&self) {
        logger::install(&self.api, logger::tracing_destination());
    }

    /// Drop the current log destination. Messages are discarded from here
    /// on; the native-side registration stays in place (the driver has no
    /// unregistration primitive).
    pub fn clear_logger(&self) {
        logger::store(None);
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver").finish_non_exhaustive()
    }
}

/// Packed driver version: major in the high 16 bits, minor in the low.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverVersion(pub(crate) u32);

impl DriverVersion {
    pub fn major(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn minor(self) -> u16 {
        self.0 as u16
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DriverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}
