//! Raw IOKit entry points
//!
//! The IOAVService symbols are exported by IOKit but not declared in any
//! public header, the prototypes follow the binaries shipped with macOS 11+.

#![allow(non_camel_case_types, non_snake_case)]

use std::ffi::{c_char, c_int, c_void};

use core_foundation::{
    base::{CFAllocatorRef, CFTypeRef},
    string::CFStringRef,
};

pub type kern_return_t = c_int;
pub type IOReturn = kern_return_t;
pub type IOOptionBits = u32;
pub type mach_port_t = u32;
pub type io_object_t = mach_port_t;
pub type io_iterator_t = io_object_t;
pub type io_registry_entry_t = io_object_t;
pub type io_service_t = io_object_t;
pub type IOAVServiceRef = CFTypeRef;

pub const KERN_SUCCESS: kern_return_t = 0;
pub const MACH_PORT_NULL: mach_port_t = 0;
pub const IO_OBJECT_NULL: io_object_t = 0;
pub const kIORegistryIterateRecursively: IOOptionBits = 0x0000_0001;
/// size of `io_name_t`
pub const IO_NAME_LEN: usize = 128;

#[link(name = "IOKit", kind = "framework")]
extern "C" {
    pub fn IOAVServiceCreate(allocator: CFAllocatorRef) -> IOAVServiceRef;
    pub fn IOAVServiceCreateWithService(
        allocator: CFAllocatorRef,
        service: io_service_t,
    ) -> IOAVServiceRef;
    pub fn IOAVServiceReadI2C(
        service: IOAVServiceRef,
        chipAddress: u32,
        offset: u32,
        outputBuffer: *mut c_void,
        outputBufferSize: u32,
    ) -> IOReturn;
    pub fn IOAVServiceWriteI2C(
        service: IOAVServiceRef,
        chipAddress: u32,
        dataAddress: u32,
        inputBuffer: *const c_void,
        inputBufferSize: u32,
    ) -> IOReturn;

    pub fn IORegistryGetRootEntry(mainPort: mach_port_t) -> io_registry_entry_t;
    pub fn IORegistryEntryCreateIterator(
        entry: io_registry_entry_t,
        plane: *const c_char,
        options: IOOptionBits,
        iterator: *mut io_iterator_t,
    ) -> kern_return_t;
    pub fn IOIteratorNext(iterator: io_iterator_t) -> io_object_t;
    pub fn IOObjectRelease(object: io_object_t) -> kern_return_t;
    pub fn IORegistryEntryGetName(entry: io_registry_entry_t, name: *mut c_char) -> kern_return_t;
    pub fn IORegistryEntryCreateCFProperty(
        entry: io_registry_entry_t,
        key: CFStringRef,
        allocator: CFAllocatorRef,
        options: IOOptionBits,
    ) -> CFTypeRef;
}
