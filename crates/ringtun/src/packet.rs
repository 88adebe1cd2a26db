//! Packet views: exclusive leases on ring-buffer slots.
//!
//! A view is valid exactly between acquisition (receive/allocate) and
//! termination (release/send). Move semantics make double-release and
//! double-send unrepresentable, and borrowing the session makes it
//! impossible to end the session while a view is outstanding.

use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::session::SessionInner;

/// A received packet, leased out of the receive ring.
///
/// Dereferences to exactly the packet's bytes. The ring slot is returned on
/// drop; release may happen on a different thread than the receive.
pub struct RecvPacket<'s> {
    session: &'s SessionInner,
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the driver allows a received packet to be released from any
// thread; the view is an exclusive lease on its slot.
unsafe impl Send for RecvPacket<'_> {}

impl<'s> RecvPacket<'s> {
    pub(crate) fn new(session: &'s SessionInner, ptr: NonNull<u8>, len: usize) -> Self {
        Self { session, ptr, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return the slot to the ring.
    ///
    /// Equivalent to dropping the view; the explicit form exists for call
    /// sites that want the release visible.
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for RecvPacket<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: the slot is exclusively leased to this view until drop.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for RecvPacket<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; &mut self gives unique access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for RecvPacket<'_> {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from receive_packet on this session and has
        // not been released before (move semantics).
        unsafe {
            self.session
                .api
                .release_receive_packet(self.session.raw, self.ptr);
        }
    }
}

impl fmt::Debug for RecvPacket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecvPacket").field("len", &self.len).finish()
    }
}

/// A send slot reserved in the send ring, awaiting its bytes.
///
/// Dereferences to exactly the allocated size. Call [`send`](Self::send) to
/// commit; a dropped, unsent view leaks its slot from the caller's
/// perspective (the ring reclaims it only when the session ends).
pub struct SendPacket<'s> {
    session: &'s SessionInner,
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the driver allows an allocated packet to be committed from any
// thread; the view is an exclusive lease on its slot.
unsafe impl Send for SendPacket<'_> {}

impl<'s> SendPacket<'s> {
    pub(crate) fn new(session: &'s SessionInner, ptr: NonNull<u8>, len: usize) -> Self {
        Self { session, ptr, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Commit the packet for transmission.
    ///
    /// The packet becomes eligible to leave in the order fixed when its
    /// slot was allocated; completion is asynchronous and not observable
    /// here.
    pub fn send(self) {
        let this = ManuallyDrop::new(self);
        // SAFETY: `ptr` came from allocate_send_packet on this session and
        // is committed exactly once (ManuallyDrop skips the Drop path).
        unsafe {
            this.session.api.send_packet(this.session.raw, this.ptr);
        }
    }
}

impl Deref for SendPacket<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: the slot is exclusively leased to this view until
        // send/drop.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for SendPacket<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; &mut self gives unique access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for SendPacket<'_> {
    fn drop(&mut self) {
        tracing::warn!(
            size = self.len,
            "send packet dropped without commit; its ring slot is leaked until the session ends"
        );
    }
}

impl fmt::Debug for SendPacket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendPacket").field("len", &self.len).finish()
    }
}
