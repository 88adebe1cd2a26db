//! Runtime-loaded Windows backend.
//!
//! Resolves the driver's user-mode library (`wintun.dll`) once at load time
//! and dispatches every [`NativeDriver`] operation through a typed function
//! pointer. No argument checking happens here; that is the safe layer's job.

use std::ffi::c_void;
use std::io;
use std::mem;
use std::ptr::{self, NonNull};

use windows_sys::core::GUID;
use windows_sys::Win32::Foundation::{
    GetLastError, FreeLibrary, HMODULE, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};
use windows_sys::Win32::System::Threading::WaitForSingleObject;

use crate::{
    NativeDriver, RawAdapter, RawError, RawEvent, RawLogger, RawSession, WaitStatus,
};

type CreateAdapterFn =
    unsafe extern "system" fn(*const u16, *const u16, *const GUID) -> *mut c_void;
type OpenAdapterFn = unsafe extern "system" fn(*const u16) -> *mut c_void;
type CloseAdapterFn = unsafe extern "system" fn(*mut c_void);
type GetAdapterLuidFn = unsafe extern "system" fn(*mut c_void, *mut u64);
type GetRunningDriverVersionFn = unsafe extern "system" fn() -> u32;
type DeleteDriverFn = unsafe extern "system" fn() -> i32;
type SetLoggerFn = unsafe extern "system" fn(Option<RawLogger>);
type StartSessionFn = unsafe extern "system" fn(*mut c_void, u32) -> *mut c_void;
type EndSessionFn = unsafe extern "system" fn(*mut c_void);
type GetReadWaitEventFn = unsafe extern "system" fn(*mut c_void) -> *mut c_void;
type ReceivePacketFn = unsafe extern "system" fn(*mut c_void, *mut u32) -> *mut u8;
type ReleaseReceivePacketFn = unsafe extern "system" fn(*mut c_void, *const u8);
type AllocateSendPacketFn = unsafe extern "system" fn(*mut c_void, u32) -> *mut u8;
type SendPacketFn = unsafe extern "system" fn(*mut c_void, *const u8);

/// The driver's user-mode library, loaded for the lifetime of this value.
pub struct WintunDll {
    module: HMODULE,
    create_adapter: CreateAdapterFn,
    open_adapter: OpenAdapterFn,
    close_adapter: CloseAdapterFn,
    get_adapter_luid: GetAdapterLuidFn,
    get_running_driver_version: GetRunningDriverVersionFn,
    delete_driver: DeleteDriverFn,
    set_logger: SetLoggerFn,
    start_session: StartSessionFn,
    end_session: EndSessionFn,
    get_read_wait_event: GetReadWaitEventFn,
    receive_packet: ReceivePacketFn,
    release_receive_packet: ReleaseReceivePacketFn,
    allocate_send_packet: AllocateSendPacketFn,
    send_packet: SendPacketFn,
}

// SAFETY: the library's exports are documented as callable from any thread;
// the struct itself holds only the module handle and immutable fn pointers.
unsafe impl Send for WintunDll {}
unsafe impl Sync for WintunDll {}

/// Frees the module unless disarmed; keeps a half-constructed `load` from
/// leaking the library when an export lookup fails.
struct ModuleGuard(HMODULE);

impl ModuleGuard {
    fn disarm(self) {
        mem::forget(self);
    }
}

impl Drop for ModuleGuard {
    fn drop(&mut self) {
        // SAFETY: the handle came from LoadLibraryW and has not been freed.
        unsafe {
            FreeLibrary(self.0);
        }
    }
}

/// Resolve one export, failing with the loader's error if absent.
unsafe fn sym<F: Copy>(module: HMODULE, name: &'static [u8]) -> io::Result<F> {
    debug_assert_eq!(name.last(), Some(&0), "symbol name must be NUL-terminated");
    match GetProcAddress(module, name.as_ptr()) {
        Some(proc) => {
            debug_assert_eq!(mem::size_of::<F>(), mem::size_of_val(&proc));
            Ok(mem::transmute_copy(&proc))
        }
        None => Err(io::Error::last_os_error()),
    }
}

fn last_error() -> RawError {
    RawError::new(unsafe { GetLastError() })
}

fn guid_from_u128(value: u128) -> GUID {
    let b = value.to_be_bytes();
    GUID {
        data1: u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        data2: u16::from_be_bytes([b[4], b[5]]),
        data3: u16::from_be_bytes([b[6], b[7]]),
        data4: [b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]],
    }
}

impl WintunDll {
    /// Load `wintun.dll` from the default search path and resolve all
    /// exports.
    pub fn load() -> io::Result<Self> {
        let name: Vec<u16> = "wintun.dll".encode_utf16().chain(Some(0)).collect();
        // SAFETY: `name` is NUL-terminated and outlives the call.
        let module = unsafe { LoadLibraryW(name.as_ptr()) };
        if module.is_null() {
            return Err(io::Error::last_os_error());
        }
        let guard = ModuleGuard(module);
        // SAFETY: module is a freshly loaded library handle.
        let dll = unsafe {
            Self {
                module,
                create_adapter: sym(module, b"WintunCreateAdapter\0")?,
                open_adapter: sym(module, b"WintunOpenAdapter\0")?,
                close_adapter: sym(module, b"WintunCloseAdapter\0")?,
                get_adapter_luid: sym(module, b"WintunGetAdapterLUID\0")?,
                get_running_driver_version: sym(module, b"WintunGetRunningDriverVersion\0")?,
                delete_driver: sym(module, b"WintunDeleteDriver\0")?,
                set_logger: sym(module, b"WintunSetLogger\0")?,
                start_session: sym(module, b"WintunStartSession\0")?,
                end_session: sym(module, b"WintunEndSession\0")?,
                get_read_wait_event: sym(module, b"WintunGetReadWaitEvent\0")?,
                receive_packet: sym(module, b"WintunReceivePacket\0")?,
                release_receive_packet: sym(module, b"WintunReleaseReceivePacket\0")?,
                allocate_send_packet: sym(module, b"WintunAllocateSendPacket\0")?,
                send_packet: sym(module, b"WintunSendPacket\0")?,
            }
        };
        // From here the dll value owns the handle; its Drop frees it.
        guard.disarm();
        Ok(dll)
    }
}

impl Drop for WintunDll {
    fn drop(&mut self) {
        // SAFETY: module was returned by LoadLibraryW and not freed before.
        unsafe {
            FreeLibrary(self.module);
        }
    }
}

// SAFETY: every method forwards to the corresponding library export, which
// implements the contract documented on `NativeDriver`.
unsafe impl NativeDriver for WintunDll {
    fn create_adapter(
        &self,
        name: &[u16],
        tunnel_type: &[u16],
        guid: Option<u128>,
    ) -> Result<RawAdapter, RawError> {
        let guid = guid.map(guid_from_u128);
        let guid_ptr = guid.as_ref().map_or(ptr::null(), |g| g as *const GUID);
        // SAFETY: both strings are NUL-terminated; guid_ptr is null or valid.
        let handle = unsafe { (self.create_adapter)(name.as_ptr(), tunnel_type.as_ptr(), guid_ptr) };
        NonNull::new(handle).map(RawAdapter).ok_or_else(last_error)
    }

    fn open_adapter(&self, name: &[u16]) -> Result<RawAdapter, RawError> {
        // SAFETY: `name` is NUL-terminated.
        let handle = unsafe { (self.open_adapter)(name.as_ptr()) };
        NonNull::new(handle).map(RawAdapter).ok_or_else(last_error)
    }

    unsafe fn close_adapter(&self, adapter: RawAdapter) {
        (self.close_adapter)(adapter.0.as_ptr());
    }

    unsafe fn adapter_luid(&self, adapter: RawAdapter) -> u128 {
        let mut luid: u64 = 0;
        (self.get_adapter_luid)(adapter.0.as_ptr(), &mut luid);
        u128::from(luid)
    }

    fn running_version(&self) -> Result<u32, RawError> {
        // SAFETY: no arguments.
        let version = unsafe { (self.get_running_driver_version)() };
        if version == 0 {
            Err(last_error())
        } else {
            Ok(version)
        }
    }

    fn delete_driver(&self) -> Result<bool, RawError> {
        // SAFETY: no arguments.
        if unsafe { (self.delete_driver)() } != 0 {
            Ok(true)
        } else {
            Err(last_error())
        }
    }

    fn set_logger(&self, logger: Option<RawLogger>) {
        // SAFETY: the callback pointer, when present, stays valid for the
        // process lifetime (the safe layer registers a static dispatcher).
        unsafe { (self.set_logger)(logger) }
    }

    unsafe fn start_session(
        &self,
        adapter: RawAdapter,
        capacity: u32,
    ) -> Result<RawSession, RawError> {
        let handle = (self.start_session)(adapter.0.as_ptr(), capacity);
        NonNull::new(handle).map(RawSession).ok_or_else(last_error)
    }

    unsafe fn end_session(&self, session: RawSession) {
        (self.end_session)(session.0.as_ptr());
    }

    unsafe fn read_wait_event(&self, session: RawSession) -> RawEvent {
        RawEvent((self.get_read_wait_event)(session.0.as_ptr()))
    }

    unsafe fn receive_packet(
        &self,
        session: RawSession,
    ) -> Result<(NonNull<u8>, u32), RawError> {
        let mut size: u32 = 0;
        let packet = (self.receive_packet)(session.0.as_ptr(), &mut size);
        match NonNull::new(packet) {
            Some(packet) => Ok((packet, size)),
            None => Err(last_error()),
        }
    }

    unsafe fn release_receive_packet(&self, session: RawSession, packet: NonNull<u8>) {
        (self.release_receive_packet)(session.0.as_ptr(), packet.as_ptr());
    }

    unsafe fn allocate_send_packet(
        &self,
        session: RawSession,
        size: u32,
    ) -> Result<NonNull<u8>, RawError> {
        let packet = (self.allocate_send_packet)(session.0.as_ptr(), size);
        NonNull::new(packet).ok_or_else(last_error)
    }

    unsafe fn send_packet(&self, session: RawSession, packet: NonNull<u8>) {
        (self.send_packet)(session.0.as_ptr(), packet.as_ptr());
    }

    unsafe fn wait_read(&self, event: RawEvent, timeout_ms: u32) -> WaitStatus {
        match WaitForSingleObject(event.0, timeout_ms) {
            WAIT_OBJECT_0 => WaitStatus::Signaled,
            WAIT_TIMEOUT => WaitStatus::TimedOut,
            _ => WaitStatus::Failed(GetLastError()),
        }
    }
}
