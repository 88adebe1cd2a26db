//! ringtun-sys: the native driver boundary.
//!
//! This crate defines the binary contract between the safe binding and the
//! kernel-mode virtual adapter driver: the constants and status codes of the
//! driver ABI, opaque handle types for each resource kind, and the
//! [`NativeDriver`] trait carrying the boundary operations.
//!
//! Two implementations exist:
//!
//! - [`WintunDll`] (Windows only): resolves the driver's user-mode library
//!   exports at runtime and dispatches directly.
//! - `LoopbackDriver` in `ringtun-testkit`: an in-process reference driver
//!   with real ring accounting, used for tests and demos.
//!
//! Everything here is deliberately thin. Argument validation, error
//! translation, and resource ownership live one layer up, in `ringtun`.

use std::ffi::c_void;
use std::ptr::NonNull;

#[cfg(windows)]
mod windows;

#[cfg(windows)]
pub use windows::WintunDll;

/// Minimum session ring capacity in bytes (128 KiB).
pub const MIN_RING_CAPACITY: u32 = 0x2_0000;
/// Maximum session ring capacity in bytes (64 MiB).
pub const MAX_RING_CAPACITY: u32 = 0x400_0000;
/// Largest IP packet the driver will move through a ring (IPv4/IPv6 limit).
pub const MAX_IP_PACKET_SIZE: u32 = 0xFFFF;
/// Maximum adapter name / tunnel type length in UTF-16 code units,
/// excluding the terminating NUL.
pub const MAX_NAME_LEN: usize = 127;

// Status codes the driver reports on failed calls. These are Win32 error
// numbers; the loopback driver emits the same values so that translation in
// the safe layer is backend-independent.

/// The call succeeded.
pub const STATUS_SUCCESS: u32 = 0;
/// The named resource does not exist (also: driver not loaded).
pub const STATUS_FILE_NOT_FOUND: u32 = 2;
/// Ring memory failed a consistency check.
pub const STATUS_INVALID_DATA: u32 = 13;
/// The adapter or session is shutting down.
pub const STATUS_HANDLE_EOF: u32 = 38;
/// An argument was rejected by the driver.
pub const STATUS_INVALID_PARAMETER: u32 = 87;
/// The send ring has insufficient free space.
pub const STATUS_BUFFER_OVERFLOW: u32 = 111;
/// The receive ring holds no unread packet.
pub const STATUS_NO_MORE_ITEMS: u32 = 259;

/// A failed boundary call, carrying the driver's status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawError {
    pub code: u32,
}

impl RawError {
    pub const fn new(code: u32) -> Self {
        Self { code }
    }
}

/// Opaque handle to a native adapter resource.
///
/// A distinct type from [`RawSession`] so the two handle kinds cannot be
/// swapped at a call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct RawAdapter(pub NonNull<c_void>);

/// Opaque handle to a native session resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct RawSession(pub NonNull<c_void>);

/// Opaque waitable handle owned by a session.
///
/// The handle is invalidated when its session ends; holders must not close
/// it independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct RawEvent(pub *mut c_void);

/// Outcome of a timed wait on a [`RawEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    /// The event was signaled.
    Signaled,
    /// The timeout elapsed with no signal.
    TimedOut,
    /// The wait itself failed; carries the status code.
    Failed(u32),
}

/// Severity of a driver log message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub enum LogLevel {
    Info = 0,
    Warn = 1,
    Err = 2,
}

/// The driver's logger callback ABI.
///
/// `timestamp` is measured in 100 ns intervals since 1601-01-01 UTC.
/// `message` points at a NUL-terminated UTF-16 string that is only valid for
/// the duration of the call.
pub type RawLogger = unsafe extern "C" fn(level: LogLevel, timestamp: u64, message: *const u16);

/// The driver boundary, one method per exported operation.
///
/// Adapter and tunnel-type names cross the boundary as NUL-terminated UTF-16
/// slices; the caller has already enforced [`MAX_NAME_LEN`].
///
/// # Safety
///
/// Implementations must uphold the driver contract: handles returned from
/// `create_adapter` / `open_adapter` / `start_session` stay valid until the
/// matching close/end call; packet pointers handed out by `receive_packet`
/// and `allocate_send_packet` stay valid and exclusively leased until the
/// matching release/send call; `read_wait_event` handles are invalidated by
/// `end_session`. Session operations must be callable concurrently from
/// multiple threads, and the order in which `allocate_send_packet` calls
/// succeed must fix the transmit order of the corresponding packets.
pub unsafe trait NativeDriver: Send + Sync + 'static {
    /// Create a new adapter. `guid` optionally pins the adapter's identity.
    fn create_adapter(
        &self,
        name: &[u16],
        tunnel_type: &[u16],
        guid: Option<u128>,
    ) -> Result<RawAdapter, RawError>;

    /// Attach to an existing adapter by name.
    fn open_adapter(&self, name: &[u16]) -> Result<RawAdapter, RawError>;

    /// Release an adapter handle.
    ///
    /// # Safety
    /// `adapter` must be a live handle from this driver; it must not be used
    /// again afterwards.
    unsafe fn close_adapter(&self, adapter: RawAdapter);

    /// Read the adapter's locally unique identifier.
    ///
    /// # Safety
    /// `adapter` must be a live handle from this driver.
    unsafe fn adapter_luid(&self, adapter: RawAdapter) -> u128;

    /// Version of the loaded driver, packed major/minor in the high/low
    /// 16 bits. [`STATUS_FILE_NOT_FOUND`] means the driver is not loaded.
    fn running_version(&self) -> Result<u32, RawError>;

    /// Ask the driver to remove itself once no adapters remain.
    fn delete_driver(&self) -> Result<bool, RawError>;

    /// Install or clear the process-wide logger callback.
    ///
    /// The driver holds at most one callback slot; passing a new pointer
    /// replaces the previous one.
    fn set_logger(&self, logger: Option<RawLogger>);

    /// Start a packet session with the given ring capacity (bytes).
    ///
    /// # Safety
    /// `adapter` must be a live handle from this driver, and `capacity` a
    /// power of two within `[MIN_RING_CAPACITY, MAX_RING_CAPACITY]`.
    unsafe fn start_session(
        &self,
        adapter: RawAdapter,
        capacity: u32,
    ) -> Result<RawSession, RawError>;

    /// End a session, releasing both rings.
    ///
    /// # Safety
    /// `session` must be a live handle from this driver; it must not be used
    /// again afterwards. All packet leases must have been terminated.
    unsafe fn end_session(&self, session: RawSession);

    /// The session's read-wait event. Owned by the session; do not close.
    ///
    /// # Safety
    /// `session` must be a live handle from this driver.
    unsafe fn read_wait_event(&self, session: RawSession) -> RawEvent;

    /// Pop the oldest unread packet from the receive ring.
    ///
    /// Returns the packet's address and exact byte length. Expected
    /// non-success codes: [`STATUS_NO_MORE_ITEMS`] (ring empty),
    /// [`STATUS_HANDLE_EOF`] (terminating), [`STATUS_INVALID_DATA`]
    /// (corrupt ring).
    ///
    /// # Safety
    /// `session` must be a live handle from this driver.
    unsafe fn receive_packet(&self, session: RawSession)
        -> Result<(NonNull<u8>, u32), RawError>;

    /// Return a received packet's slot to the ring.
    ///
    /// # Safety
    /// `packet` must be an address handed out by `receive_packet` on this
    /// session, not yet released.
    unsafe fn release_receive_packet(&self, session: RawSession, packet: NonNull<u8>);

    /// Reserve `size` contiguous bytes in the send ring.
    ///
    /// Expected non-success codes: [`STATUS_BUFFER_OVERFLOW`] (ring full),
    /// [`STATUS_HANDLE_EOF`] (terminating).
    ///
    /// # Safety
    /// `session` must be a live handle from this driver, and `size` within
    /// `1..=MAX_IP_PACKET_SIZE`.
    unsafe fn allocate_send_packet(
        &self,
        session: RawSession,
        size: u32,
    ) -> Result<NonNull<u8>, RawError>;

    /// Commit an allocated packet for transmission.
    ///
    /// Transmission completion is asynchronous; this only makes the packet
    /// eligible to leave in the order fixed by allocation.
    ///
    /// # Safety
    /// `packet` must be an address handed out by `allocate_send_packet` on
    /// this session, not yet sent.
    unsafe fn send_packet(&self, session: RawSession, packet: NonNull<u8>);

    /// Block until `event` signals or `timeout_ms` elapses.
    ///
    /// # Safety
    /// `event` must be a live handle from `read_wait_event` whose session
    /// has not ended.
    unsafe fn wait_read(&self, event: RawEvent, timeout_ms: u32) -> WaitStatus;
}
