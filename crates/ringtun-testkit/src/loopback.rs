//! In-process reference driver.
//!
//! Implements the full `NativeDriver` boundary with real ring accounting so
//! the safe layer can be exercised without the kernel driver: byte-quota
//! backpressure on both rings, allocation-order transmit commit, the
//! empty-to-non-empty wait-event transition, and injectable terminating /
//! corrupt-ring faults.
//!
//! Packets live in individually boxed buffers rather than one contiguous
//! mapping; quota accounting still charges the aligned on-ring cost per
//! packet, so capacity behavior matches the real rings.

use std::collections::{HashMap, VecDeque};
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use ringtun_sys::{
    LogLevel, NativeDriver, RawAdapter, RawError, RawEvent, RawLogger, RawSession, WaitStatus,
    MAX_IP_PACKET_SIZE, MAX_RING_CAPACITY, MIN_RING_CAPACITY, STATUS_BUFFER_OVERFLOW,
    STATUS_FILE_NOT_FOUND, STATUS_HANDLE_EOF, STATUS_INVALID_DATA, STATUS_INVALID_PARAMETER,
    STATUS_NO_MORE_ITEMS,
};

use crate::event::Event;

/// Fixed per-packet overhead charged against the ring quota, standing in
/// for the on-ring packet header.
const PACKET_OVERHEAD: u32 = 8;

/// On-ring cost of one packet: payload aligned to 4 bytes plus the header.
fn packet_cost(size: u32) -> u32 {
    ((size + 3) & !3) + PACKET_OVERHEAD
}

/// Current time in the driver log timestamp format (100 ns intervals since
/// 1601-01-01 UTC).
pub fn filetime_now() -> u64 {
    const FILETIME_UNIX_OFFSET_SECS: u64 = 11_644_473_600;
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    (FILETIME_UNIX_OFFSET_SECS + since_epoch.as_secs()) * 10_000_000
        + u64::from(since_epoch.subsec_nanos()) / 100
}

struct Registry {
    adapters: Mutex<HashMap<String, Arc<AdapterState>>>,
    logger: Mutex<Option<RawLogger>>,
    next_luid: AtomicU64,
}

struct AdapterState {
    name: String,
    luid: u128,
    session: Mutex<Weak<SessionState>>,
}

struct SessionState {
    capacity: u32,
    recv: Mutex<RecvRing>,
    send: Mutex<SendRing>,
    event: Event,
    terminating: AtomicBool,
    corrupt_recv: AtomicBool,
}

/// Driver-to-caller ring: injected packets queue in arrival order, then get
/// leased out one at a time by `receive_packet`.
#[derive(Default)]
struct RecvRing {
    used: u32,
    pending: VecDeque<Box<[u8]>>,
    leased: Vec<Box<[u8]>>,
}

/// Caller-to-driver ring: slots in allocation order, committed slots drain
/// to the transmit capture only once every earlier slot has committed.
#[derive(Default)]
struct SendRing {
    used: u32,
    slots: VecDeque<SendSlot>,
    transmitted: Vec<Vec<u8>>,
}

struct SendSlot {
    data: Box<[u8]>,
    committed: bool,
}

impl SessionState {
    fn check_open(&self) -> Result<(), RawError> {
        if self.terminating.load(Ordering::Acquire) {
            Err(RawError::new(STATUS_HANDLE_EOF))
        } else {
            Ok(())
        }
    }
}

/// An in-process `NativeDriver` implementation.
///
/// Clones share one adapter registry, so a clone handed to
/// [`ringtun::Driver::new`] and the original used for [`tap`](Self::tap)
/// access observe the same adapters.
#[derive(Clone, Default)]
pub struct LoopbackDriver {
    registry: Arc<Registry>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            adapters: Mutex::new(HashMap::new()),
            logger: Mutex::new(None),
            next_luid: AtomicU64::new(1),
        }
    }
}

impl LoopbackDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test port for an adapter created through this driver. `None` if no
    /// adapter with that name exists yet.
    pub fn tap(&self, name: &str) -> Option<LoopbackTap> {
        self.registry
            .adapters
            .lock()
            .get(name)
            .map(|adapter| LoopbackTap {
                adapter: adapter.clone(),
            })
    }

    fn log(&self, level: LogLevel, message: &str) {
        let logger = *self.registry.logger.lock();
        if let Some(logger) = logger {
            let wide: Vec<u16> = message.encode_utf16().chain(Some(0)).collect();
            // SAFETY: `wide` is NUL-terminated and outlives the call.
            unsafe { logger(level, filetime_now(), wide.as_ptr()) };
        }
    }
}

fn decode_name(units: &[u16]) -> String {
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

/// # Safety
/// `adapter` must be a live handle produced by this module.
unsafe fn adapter_ref<'a>(adapter: RawAdapter) -> &'a AdapterState {
    unsafe { &*(adapter.0.as_ptr() as *const AdapterState) }
}

/// # Safety
/// `session` must be a live handle produced by this module.
unsafe fn session_ref<'a>(session: RawSession) -> &'a SessionState {
    unsafe { &*(session.0.as_ptr() as *const SessionState) }
}

// SAFETY: handles are reference-counted pointers to registry-owned state;
// every boundary obligation (handle liveness, exclusive packet leases,
// allocation-order transmit) is enforced by the ring bookkeeping below.
unsafe impl NativeDriver for LoopbackDriver {
    fn create_adapter(
        &self,
        name: &[u16],
        _tunnel_type: &[u16],
        guid: Option<u128>,
    ) -> Result<RawAdapter, RawError> {
        let name = decode_name(name);
        let luid = guid.unwrap_or_else(|| {
            u128::from(self.registry.next_luid.fetch_add(1, Ordering::Relaxed))
        });
        let adapter = Arc::new(AdapterState {
            name: name.clone(),
            luid,
            session: Mutex::new(Weak::new()),
        });
        self.registry
            .adapters
            .lock()
            .insert(name.clone(), adapter.clone());
        self.log(LogLevel::Info, &format!("adapter {name} created"));
        let ptr = Arc::into_raw(adapter) as *mut c_void;
        Ok(RawAdapter(NonNull::new(ptr).expect("Arc::into_raw is never null")))
    }

    fn open_adapter(&self, name: &[u16]) -> Result<RawAdapter, RawError> {
        let name = decode_name(name);
        let adapter = self
            .registry
            .adapters
            .lock()
            .get(&name)
            .cloned()
            .ok_or(RawError::new(STATUS_FILE_NOT_FOUND))?;
        let ptr = Arc::into_raw(adapter) as *mut c_void;
        Ok(RawAdapter(NonNull::new(ptr).expect("Arc::into_raw is never null")))
    }

    unsafe fn close_adapter(&self, adapter: RawAdapter) {
        // SAFETY: handle was produced by Arc::into_raw above.
        drop(unsafe { Arc::from_raw(adapter.0.as_ptr() as *const AdapterState) });
    }

    unsafe fn adapter_luid(&self, adapter: RawAdapter) -> u128 {
        unsafe { adapter_ref(adapter) }.luid
    }

    fn running_version(&self) -> Result<u32, RawError> {
        // Loopback reports itself as 0.1.
        Ok(0x0000_0001)
    }

    fn delete_driver(&self) -> Result<bool, RawError> {
        Ok(true)
    }

    fn set_logger(&self, logger: Option<RawLogger>) {
        *self.registry.logger.lock() = logger;
    }

    unsafe fn start_session(
        &self,
        adapter: RawAdapter,
        capacity: u32,
    ) -> Result<RawSession, RawError> {
        if !capacity.is_power_of_two()
            || !(MIN_RING_CAPACITY..=MAX_RING_CAPACITY).contains(&capacity)
        {
            return Err(RawError::new(STATUS_INVALID_PARAMETER));
        }
        let adapter = unsafe { adapter_ref(adapter) };
        let session = Arc::new(SessionState {
            capacity,
            recv: Mutex::new(RecvRing::default()),
            send: Mutex::new(SendRing::default()),
            event: Event::new(),
            terminating: AtomicBool::new(false),
            corrupt_recv: AtomicBool::new(false),
        });
        *adapter.session.lock() = Arc::downgrade(&session);
        self.log(
            LogLevel::Info,
            &format!("session started on {} ({capacity} byte rings)", adapter.name),
        );
        let ptr = Arc::into_raw(session) as *mut c_void;
        Ok(RawSession(NonNull::new(ptr).expect("Arc::into_raw is never null")))
    }

    unsafe fn end_session(&self, session: RawSession) {
        // SAFETY: handle was produced by Arc::into_raw above.
        drop(unsafe { Arc::from_raw(session.0.as_ptr() as *const SessionState) });
    }

    unsafe fn read_wait_event(&self, session: RawSession) -> RawEvent {
        let session = unsafe { session_ref(session) };
        RawEvent(&session.event as *const Event as *mut c_void)
    }

    unsafe fn receive_packet(
        &self,
        session: RawSession,
    ) -> Result<(NonNull<u8>, u32), RawError> {
        let session = unsafe { session_ref(session) };
        if session.corrupt_recv.load(Ordering::Acquire) {
            return Err(RawError::new(STATUS_INVALID_DATA));
        }
        session.check_open()?;
        let mut ring = session.recv.lock();
        match ring.pending.pop_front() {
            Some(mut data) => {
                let len = data.len() as u32;
                let ptr = NonNull::new(data.as_mut_ptr()).expect("boxed buffer is never null");
                ring.leased.push(data);
                Ok((ptr, len))
            }
            None => Err(RawError::new(STATUS_NO_MORE_ITEMS)),
        }
    }

    unsafe fn release_receive_packet(&self, session: RawSession, packet: NonNull<u8>) {
        let session = unsafe { session_ref(session) };
        let mut ring = session.recv.lock();
        match ring
            .leased
            .iter()
            .position(|data| data.as_ptr() == packet.as_ptr().cast_const())
        {
            Some(index) => {
                let data = ring.leased.swap_remove(index);
                ring.used -= packet_cost(data.len() as u32);
            }
            None => {
                tracing::warn!("release of a pointer that is not a leased receive packet");
            }
        }
    }

    unsafe fn allocate_send_packet(
        &self,
        session: RawSession,
        size: u32,
    ) -> Result<NonNull<u8>, RawError> {
        if size == 0 || size > MAX_IP_PACKET_SIZE {
            return Err(RawError::new(STATUS_INVALID_PARAMETER));
        }
        let session = unsafe { session_ref(session) };
        session.check_open()?;
        let mut ring = session.send.lock();
        let cost = packet_cost(size);
        if ring.used + cost > session.capacity {
            return Err(RawError::new(STATUS_BUFFER_OVERFLOW));
        }
        ring.used += cost;
        let mut data = vec![0u8; size as usize].into_boxed_slice();
        let ptr = NonNull::new(data.as_mut_ptr()).expect("boxed buffer is never null");
        ring.slots.push_back(SendSlot {
            data,
            committed: false,
        });
        Ok(ptr)
    }

    unsafe fn send_packet(&self, session: RawSession, packet: NonNull<u8>) {
        let session = unsafe { session_ref(session) };
        let mut ring = session.send.lock();
        match ring
            .slots
            .iter_mut()
            .find(|slot| slot.data.as_ptr() == packet.as_ptr().cast_const())
        {
            Some(slot) => slot.committed = true,
            None => {
                tracing::warn!("send of a pointer that is not an allocated send packet");
                return;
            }
        }
        // Transmit order is allocation order: a committed slot leaves only
        // once everything allocated before it has left.
        while ring.slots.front().is_some_and(|slot| slot.committed) {
            let slot = ring.slots.pop_front().expect("front just checked");
            ring.used -= packet_cost(slot.data.len() as u32);
            ring.transmitted.push(slot.data.into_vec());
        }
    }

    unsafe fn wait_read(&self, event: RawEvent, timeout_ms: u32) -> WaitStatus {
        // SAFETY: the event lives inside a session the caller keeps alive.
        let event = unsafe { &*(event.0 as *const Event) };
        if event.wait(Duration::from_millis(u64::from(timeout_ms))) {
            WaitStatus::Signaled
        } else {
            WaitStatus::TimedOut
        }
    }
}

/// Per-adapter test port: injects inbound packets and observes outbound
/// ones, and injects session faults.
pub struct LoopbackTap {
    adapter: Arc<AdapterState>,
}

impl LoopbackTap {
    fn session(&self) -> Option<Arc<SessionState>> {
        self.adapter.session.lock().upgrade()
    }

    /// Queue a packet on the session's receive ring, as the driver would on
    /// packet arrival. Returns `false` when there is no live session, the
    /// session is terminating, or the ring lacks space.
    ///
    /// # Panics
    /// If `packet` is empty or larger than an IP packet can be.
    pub fn inject(&self, packet: &[u8]) -> bool {
        assert!(
            !packet.is_empty() && packet.len() <= MAX_IP_PACKET_SIZE as usize,
            "injected packet size must be within 1..={MAX_IP_PACKET_SIZE}"
        );
        let Some(session) = self.session() else {
            return false;
        };
        if session.terminating.load(Ordering::Acquire) {
            return false;
        }
        let mut ring = session.recv.lock();
        let cost = packet_cost(packet.len() as u32);
        if ring.used + cost > session.capacity {
            return false;
        }
        let was_empty = ring.pending.is_empty();
        ring.used += cost;
        ring.pending.push_back(packet.to_vec().into_boxed_slice());
        drop(ring);
        if was_empty {
            session.event.signal();
        }
        true
    }

    /// Drain everything the session has committed for transmission, in
    /// transmit order.
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        match self.session() {
            Some(session) => std::mem::take(&mut session.send.lock().transmitted),
            None => Vec::new(),
        }
    }

    /// Flip the session into its terminating state: packet operations start
    /// failing with the terminating status and the read-wait event latches.
    pub fn begin_teardown(&self) {
        if let Some(session) = self.session() {
            session.terminating.store(true, Ordering::Release);
            session.event.latch();
        }
    }

    /// Make the receive ring report consistency damage on every subsequent
    /// receive.
    pub fn corrupt_receive_ring(&self) {
        if let Some(session) = self.session() {
            session.corrupt_recv.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_cost_is_aligned_plus_overhead() {
        assert_eq!(packet_cost(1), 4 + PACKET_OVERHEAD);
        assert_eq!(packet_cost(4), 4 + PACKET_OVERHEAD);
        assert_eq!(packet_cost(5), 8 + PACKET_OVERHEAD);
        assert_eq!(packet_cost(65535), 65536 + PACKET_OVERHEAD);
    }

    #[test]
    fn filetime_now_is_after_2020() {
        // 2020-01-01 as 100ns intervals since 1601.
        const Y2020: u64 = 132_223_104_000_000_000;
        assert!(filetime_now() > Y2020);
    }
}
