//! IOAVService backend
//!
//! Apple Silicon machines expose the DDC of external displays through the
//! private `IOAVService` object of IOKit instead of a plain I2C bus.

pub mod ffi;
pub mod registry;

use std::{ffi::c_void, ptr::NonNull};

use core_foundation::base::{CFAllocatorRef, CFRelease, CFRetain};

use super::{abi_len, AllocatorToken, AvPlatform, IoReturn};

pub use registry::{discover_display_services, DisplayService, RegistryEntry};

/// The IOKit implementation of [`AvPlatform`]
#[derive(Debug, Clone, Copy, Default)]
pub struct IoKitPlatform;

/// One owned reference on an `IOAVService` Core Foundation object
#[derive(Debug, PartialEq, Eq)]
pub struct AvServiceRef(NonNull<c_void>);

// CF objects may be retained, released and used from any thread; ordering of
// transfers is up to the caller.
unsafe impl Send for AvServiceRef {}

impl AvServiceRef {
    /// wrap the result of a `Create` call, null means the call failed
    fn from_create_rule(raw: ffi::IOAVServiceRef) -> Option<Self> {
        NonNull::new(raw as *mut c_void).map(AvServiceRef)
    }

    pub fn as_ptr(&self) -> ffi::IOAVServiceRef {
        self.0.as_ptr() as ffi::IOAVServiceRef
    }
}

fn cf_allocator(allocator: AllocatorToken) -> CFAllocatorRef {
    allocator.as_ptr() as CFAllocatorRef
}

impl AvPlatform for IoKitPlatform {
    type Device = RegistryEntry;
    type Handle = AvServiceRef;

    fn create(&self, allocator: AllocatorToken) -> Option<AvServiceRef> {
        // SAFETY: the allocator is null or valid per `AllocatorToken::from_raw`
        let raw = unsafe { ffi::IOAVServiceCreate(cf_allocator(allocator)) };
        AvServiceRef::from_create_rule(raw)
    }

    fn create_with_service(
        &self,
        allocator: AllocatorToken,
        device: &RegistryEntry,
    ) -> Option<AvServiceRef> {
        // SAFETY: `device` keeps the registry entry alive for the duration of the call
        let raw = unsafe {
            ffi::IOAVServiceCreateWithService(cf_allocator(allocator), device.as_raw())
        };
        AvServiceRef::from_create_rule(raw)
    }

    fn read_i2c(
        &self,
        handle: &AvServiceRef,
        chip_address: u32,
        offset: u32,
        buf: &mut [u8],
    ) -> IoReturn {
        let Some(len) = abi_len(buf) else {
            return IoReturn::BAD_ARGUMENT;
        };
        // SAFETY: the handle is a live IOAVService and `buf` is valid for `len` bytes
        let status = unsafe {
            ffi::IOAVServiceReadI2C(
                handle.as_ptr(),
                chip_address,
                offset,
                buf.as_mut_ptr().cast(),
                len,
            )
        };
        IoReturn(status)
    }

    fn write_i2c(
        &self,
        handle: &AvServiceRef,
        chip_address: u32,
        data_address: u32,
        buf: &[u8],
    ) -> IoReturn {
        let Some(len) = abi_len(buf) else {
            return IoReturn::BAD_ARGUMENT;
        };
        // SAFETY: the handle is a live IOAVService, the platform only reads from `buf`
        let status = unsafe {
            ffi::IOAVServiceWriteI2C(
                handle.as_ptr(),
                chip_address,
                data_address,
                buf.as_ptr().cast(),
                len,
            )
        };
        IoReturn(status)
    }

    fn retain(&self, handle: &AvServiceRef) -> AvServiceRef {
        // SAFETY: the handle holds a reference so the object is alive
        unsafe { CFRetain(handle.as_ptr()) };
        AvServiceRef(handle.0)
    }

    fn release(&self, handle: AvServiceRef) {
        // SAFETY: consumes the reference owned by `handle`
        unsafe { CFRelease(handle.as_ptr()) }
    }
}
