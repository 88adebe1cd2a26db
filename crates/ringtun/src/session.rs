//! Packet sessions: the receive/send ring contract and wait-for-data.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use ringtun_sys::{
    NativeDriver, RawEvent, RawSession, WaitStatus, MAX_IP_PACKET_SIZE,
    STATUS_BUFFER_OVERFLOW, STATUS_NO_MORE_ITEMS,
};

use crate::adapter::AdapterInner;
use crate::error::{session_err, Error, Result};
use crate::packet::{RecvPacket, SendPacket};

/// Owns the native session handle and its read-wait event. Keeps the
/// adapter alive: the driver requires a session to end before its adapter
/// closes, and the `Arc` chain encodes exactly that.
pub(crate) struct SessionInner {
    pub(crate) api: Arc<dyn NativeDriver>,
    pub(crate) raw: RawSession,
    event: RawEvent,
    _adapter: Arc<AdapterInner>,
}

// SAFETY: the driver documents all session operations, including waits on
// the read event, as callable concurrently from any thread. The handle is
// ended exactly once, by Drop.
unsafe impl Send for SessionInner {}
unsafe impl Sync for SessionInner {}

impl SessionInner {
    pub(crate) fn wait_for_read(&self, timeout: Duration) -> Result<WaitOutcome> {
        // The native wait takes whole milliseconds; round up so control
        // never returns before the requested timeout. The largest
        // representable value short of infinity is the cap.
        let ms = timeout
            .as_nanos()
            .div_ceil(1_000_000)
            .min(u128::from(u32::MAX - 1)) as u32;
        // SAFETY: `event` belongs to `raw`, which is live while self is.
        match unsafe { self.api.wait_read(self.event, ms) } {
            WaitStatus::Signaled => Ok(WaitOutcome::Ready),
            WaitStatus::TimedOut => Ok(WaitOutcome::TimedOut),
            WaitStatus::Failed(code) => Err(Error::NativeCallFailed {
                call: "wait_read",
                code,
            }),
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        // SAFETY: `raw` is the live handle this value owns. Packet views
        // borrow the public `Session`, so none can be outstanding here.
        unsafe { self.api.end_session(self.raw) };
    }
}

/// An open packet session on an adapter.
///
/// All operations take `&self` and are safe to call concurrently from
/// multiple threads without external locking. The session ends (releasing
/// both rings) exactly once, when dropped or explicitly [`end`](Self::end)ed.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn start(adapter: Arc<AdapterInner>, capacity: u32) -> Result<Self> {
        // SAFETY: the adapter handle is live (we hold its Arc) and capacity
        // was validated by the caller.
        let raw = unsafe { adapter.api.start_session(adapter.raw, capacity) }
            .map_err(|e| session_err("start_session", e))?;
        // SAFETY: `raw` is the live session we just started.
        let event = unsafe { adapter.api.read_wait_event(raw) };
        Ok(Self {
            inner: Arc::new(SessionInner {
                api: adapter.api.clone(),
                raw,
                event,
                _adapter: adapter,
            }),
        })
    }

    /// Pop the oldest unread packet from the receive ring.
    ///
    /// `Ok(None)` means the ring is empty right now; that is the normal
    /// polling outcome, not a failure. The returned view leases its ring
    /// slot until dropped (or [`RecvPacket::release`]d).
    pub fn receive(&self) -> Result<Option<RecvPacket<'_>>> {
        // SAFETY: the session handle is live while `inner` is.
        match unsafe { self.inner.api.receive_packet(self.inner.raw) } {
            Ok((ptr, len)) => Ok(Some(RecvPacket::new(&self.inner, ptr, len as usize))),
            Err(e) if e.code == STATUS_NO_MORE_ITEMS => Ok(None),
            Err(e) => Err(session_err("receive_packet", e)),
        }
    }

    /// Reserve `size` contiguous bytes in the send ring.
    ///
    /// `Ok(None)` means the ring currently has insufficient free space:
    /// backpressure, retry later. The order in which allocations succeed,
    /// across all threads, fixes the transmit order of the packets; commit
    /// each view with [`SendPacket::send`] once its bytes are written.
    pub fn allocate_send(&self, size: usize) -> Result<Option<SendPacket<'_>>> {
        if size == 0 || size > MAX_IP_PACKET_SIZE as usize {
            return Err(Error::InvalidArgument(format!(
                "packet size {size} is outside 1..={MAX_IP_PACKET_SIZE}"
            )));
        }
        // SAFETY: the session handle is live and `size` was just validated.
        match unsafe { self.inner.api.allocate_send_packet(self.inner.raw, size as u32) } {
            Ok(ptr) => Ok(Some(SendPacket::new(&self.inner, ptr, size))),
            Err(e) if e.code == STATUS_BUFFER_OVERFLOW => Ok(None),
            Err(e) => Err(session_err("allocate_send_packet", e)),
        }
    }

    /// The session's read-wait handle.
    ///
    /// Signaled when the receive ring goes from empty to holding data, or
    /// when the session begins terminating. The session owns the handle;
    /// holders must not close it.
    pub fn wait_handle(&self) -> WaitHandle<'_> {
        WaitHandle {
            raw: self.inner.event,
            _session: PhantomData,
        }
    }

    /// Block until the read-wait handle signals or `timeout` elapses.
    ///
    /// The underlying primitive offers no cancellation beyond the timeout;
    /// build longer cancellable waits by looping with short timeouts and
    /// checking an external flag between iterations.
    pub fn wait_for_read(&self, timeout: Duration) -> Result<WaitOutcome> {
        self.inner.wait_for_read(timeout)
    }

    /// Like [`wait_for_read`](Self::wait_for_read), but suspends the task
    /// instead of blocking the thread.
    ///
    /// The wait runs on the blocking pool; the session stays alive until it
    /// resolves even if this `Session` is dropped mid-wait.
    #[cfg(feature = "async")]
    pub async fn wait_for_read_async(&self, timeout: Duration) -> Result<WaitOutcome> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.wait_for_read(timeout))
            .await
            .map_err(|_| Error::NativeCallFailed {
                call: "wait_read",
                // ERROR_OPERATION_ABORTED: the blocking pool went away
                // mid-wait (runtime shutdown).
                code: 995,
            })?
    }

    /// End the session, releasing both rings.
    ///
    /// Equivalent to dropping it; the explicit form exists for call sites
    /// that want the release visible.
    pub fn end(self) {
        drop(self);
    }
}

/// Outcome of a wait on the read-wait handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The handle signaled: data is likely available, or the session is
    /// terminating. Poll [`Session::receive`] to find out which.
    Ready,
    /// The timeout elapsed with no signal.
    TimedOut,
}

/// Borrowed, opaque view of the session's read-wait handle.
#[derive(Clone, Copy)]
pub struct WaitHandle<'s> {
    raw: RawEvent,
    _session: PhantomData<&'s SessionInner>,
}

impl WaitHandle<'_> {
    /// The raw waitable handle, for integration with platform wait APIs.
    /// Do not close it; the session owns it.
    pub fn as_raw(&self) -> *mut c_void {
        self.raw.0
    }
}
