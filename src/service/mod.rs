//! The I2C service facade
//!
//! Opens sessions on a display's control channel and issues raw I2C reads
//! and writes against them. Everything happens inside the platform, this
//! layer only forwards the calls and owns the handle lifetime.

mod handle;
pub mod status;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "macos")]
pub mod mac_os;
#[cfg(any(test, feature = "stub"))]
pub mod stub;

use std::{ffi::c_void, ptr};

pub use handle::AvService;
pub use status::{IoReturn, StatusCategory};

/// Selects the allocator the platform uses for a returned handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorToken(*const c_void);

impl AllocatorToken {
    /// null sentinel, let the platform pick its default allocator
    pub const DEFAULT: Self = AllocatorToken(ptr::null());

    /// # Safety
    ///
    /// `allocator` must be null or a valid allocator reference of the
    /// platform for as long as it is used to open handles.
    pub unsafe fn from_raw(allocator: *const c_void) -> Self {
        AllocatorToken(allocator)
    }

    pub fn as_ptr(&self) -> *const c_void {
        self.0
    }

    pub fn is_default(&self) -> bool {
        self.0.is_null()
    }
}

impl Default for AllocatorToken {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Low level AV service entry points of a host platform.
///
/// Implementations mirror the platform ABI one to one: construction signals
/// failure with `None`, transfers return the platform status untouched and
/// handles are reference counted through [`retain`](AvPlatform::retain) and
/// [`release`](AvPlatform::release).
pub trait AvPlatform: Clone {
    /// identifies a registered display device of the platform
    type Device;
    /// raw reference counted session token
    type Handle;

    /// Open the platform's default AV service.
    fn create(&self, allocator: AllocatorToken) -> Option<Self::Handle>;

    /// Open the AV service bound to `device`.
    fn create_with_service(
        &self,
        allocator: AllocatorToken,
        device: &Self::Device,
    ) -> Option<Self::Handle>;

    /// Fill `buf` with bytes the chip at `chip_address` provides starting at `offset`.
    fn read_i2c(
        &self,
        handle: &Self::Handle,
        chip_address: u32,
        offset: u32,
        buf: &mut [u8],
    ) -> IoReturn;

    /// Send `buf` to the chip at `chip_address` prefixed by `data_address`.
    fn write_i2c(
        &self,
        handle: &Self::Handle,
        chip_address: u32,
        data_address: u32,
        buf: &[u8],
    ) -> IoReturn;

    /// Take an additional reference on `handle`.
    fn retain(&self, handle: &Self::Handle) -> Self::Handle;

    /// Drop one reference, the handle must not be used afterwards.
    fn release(&self, handle: Self::Handle);
}

/// Entry point for I2C transactions with attached displays.
#[derive(Debug, Clone, Default)]
pub struct I2cService<P: AvPlatform> {
    platform: P,
}

impl<P: AvPlatform> I2cService<P> {
    pub fn new(platform: P) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Open the default AV service of the platform.
    ///
    /// Returns `None` if there is none or access is refused. Which display
    /// is picked when several are attached is decided by the platform, use
    /// [`open_for_device`](Self::open_for_device) to target one.
    pub fn open_default(&self, allocator: AllocatorToken) -> Option<AvService<P>> {
        self.platform
            .create(allocator)
            .map(|raw| AvService::from_raw(self.platform.clone(), raw))
    }

    /// Open the AV service of a specific display device.
    pub fn open_for_device(
        &self,
        allocator: AllocatorToken,
        device: &P::Device,
    ) -> Option<AvService<P>> {
        self.platform
            .create_with_service(allocator, device)
            .map(|raw| AvService::from_raw(self.platform.clone(), raw))
    }

    /// Read `buf.len()` bytes from `chip_address` starting at `offset`.
    ///
    /// The transfer goes to the platform `handle` was opened on. The content of `buf` is unspecified unless the returned status is a
    /// success.
    pub fn read(
        &self,
        handle: &AvService<P>,
        chip_address: u32,
        offset: u32,
        buf: &mut [u8],
    ) -> IoReturn {
        handle.read_i2c(chip_address, offset, buf)
    }

    /// Write all of `buf` to `chip_address` behind the sub-address `data_address`.
    pub fn write(
        &self,
        handle: &AvService<P>,
        chip_address: u32,
        data_address: u32,
        buf: &[u8],
    ) -> IoReturn {
        handle.write_i2c(chip_address, data_address, buf)
    }
}

#[cfg(target_os = "macos")]
impl I2cService<mac_os::IoKitPlatform> {
    /// Service backed by the IOAVService entry points of IOKit
    pub fn native() -> Self {
        Self::new(mac_os::IoKitPlatform)
    }
}

#[cfg(target_os = "linux")]
impl I2cService<linux::LinuxPlatform> {
    /// Service backed by the kernel i2c-dev interface
    pub fn native() -> Self {
        Self::new(linux::LinuxPlatform)
    }
}

/// Length of a transfer as the platform ABI expects it
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub(crate) fn abi_len(buf: &[u8]) -> Option<u32> {
    u32::try_from(buf.len()).ok()
}

#[cfg(test)]
mod test {
    use super::{
        stub::{StubCall, StubDevice, StubPlatform},
        AllocatorToken, I2cService, IoReturn,
    };
    use crate::ddc::eddc::{I2C_DDC_7BIT_ADDRESS, I2C_DDC_DATA_ADDRESS};

    const DDC: u32 = I2C_DDC_7BIT_ADDRESS as u32;
    const DDC_DATA: u32 = I2C_DDC_DATA_ADDRESS as u32;

    #[test]
    fn read_single_byte() {
        let stub = StubPlatform::new();
        stub.respond_with(&[0xab]);
        let service = I2cService::new(stub.clone());
        {
            let handle = service.open_default(AllocatorToken::DEFAULT).unwrap();
            let mut buf = [0u8; 1];
            let status = service.read(&handle, DDC, DDC_DATA, &mut buf);
            assert_eq!(status, IoReturn::SUCCESS);
            assert_eq!(buf[0], 0xab);
        }
        assert_eq!(stub.releases(), 1);
    }

    #[test]
    fn write_transmits_exact_bytes() {
        let stub = StubPlatform::new();
        let service = I2cService::new(stub.clone());
        let handle = service.open_default(AllocatorToken::DEFAULT).unwrap();
        let frame = [0x03, 0x10, 0x00, 0x32];

        let status = service.write(&handle, DDC, DDC_DATA, &frame);

        assert_eq!(status, IoReturn::SUCCESS);
        assert_eq!(stub.written(), vec![frame.to_vec()]);
        assert!(stub.calls().contains(&StubCall::Write {
            chip_address: DDC,
            data_address: DDC_DATA,
            data: frame.to_vec(),
        }));
        drop(handle);
        stub.assert_balanced();
    }

    #[test]
    fn echo_round_trip() {
        let stub = StubPlatform::new();
        stub.set_echo(true);
        let service = I2cService::new(stub.clone());
        let handle = service.open_default(AllocatorToken::DEFAULT).unwrap();

        for len in [1usize, 2, 7, 32, 64, 127, 128] {
            let data: Vec<u8> = (0..len).map(|i| (i * 31 + len) as u8).collect();
            assert!(service.write(&handle, DDC, DDC_DATA, &data).is_success());
            let mut buf = vec![0u8; len];
            assert!(service.read(&handle, DDC, DDC_DATA, &mut buf).is_success());
            assert_eq!(buf, data);
        }
        drop(handle);
        stub.assert_balanced();
    }

    #[test]
    fn rejected_device_returns_none() {
        let stub = StubPlatform::new();
        let device = StubDevice(7);
        stub.reject_device(device);
        let service = I2cService::new(stub.clone());

        assert!(service
            .open_for_device(AllocatorToken::DEFAULT, &device)
            .is_none());
        assert_eq!(stub.calls(), vec![StubCall::CreateWithService(device)]);
        assert_eq!(stub.releases(), 0);
    }

    #[test]
    fn failed_default_open_issues_no_further_calls() {
        let stub = StubPlatform::new();
        stub.fail_open(true);
        let service = I2cService::new(stub.clone());

        assert!(service.open_default(AllocatorToken::DEFAULT).is_none());
        assert_eq!(stub.calls(), vec![StubCall::Create]);
    }

    #[test]
    fn accepted_device_is_bound() {
        let stub = StubPlatform::new();
        let service = I2cService::new(stub.clone());
        let handle = service
            .open_for_device(AllocatorToken::DEFAULT, &StubDevice(3))
            .unwrap();
        assert_eq!(stub.device_of(handle.raw()), Some(StubDevice(3)));
        drop(handle);
        stub.assert_balanced();
    }

    #[test]
    fn status_is_passed_through_verbatim() {
        let stub = StubPlatform::new();
        let service = I2cService::new(stub.clone());
        let handle = service.open_default(AllocatorToken::DEFAULT).unwrap();

        for status in [
            IoReturn::TIMEOUT,
            IoReturn::NOT_RESPONDING,
            IoReturn(1),
            IoReturn(-1),
            IoReturn(i32::MIN),
        ] {
            stub.script_read(status, &[]);
            stub.script_write(status);
            let mut buf = [0u8; 4];
            assert_eq!(service.read(&handle, DDC, DDC_DATA, &mut buf), status);
            assert_eq!(service.write(&handle, DDC, DDC_DATA, &[0x01]), status);
        }
    }

    #[test]
    fn transfers_follow_the_handle_platform() {
        let owner = StubPlatform::new();
        owner.respond_with(&[0x42]);
        let other = StubPlatform::new();
        let handle = I2cService::new(owner.clone())
            .open_default(AllocatorToken::DEFAULT)
            .unwrap();
        let service = I2cService::new(other.clone());

        let mut buf = [0u8; 1];
        assert!(service.read(&handle, DDC, DDC_DATA, &mut buf).is_success());
        assert_eq!(buf, [0x42]);
        assert!(service.write(&handle, DDC, DDC_DATA, &[0x01]).is_success());

        assert!(other.calls().is_empty());
        assert_eq!(owner.written(), vec![vec![0x01]]);
        drop(handle);
        owner.assert_balanced();
    }

    #[test]
    fn repeated_reads_are_identical() {
        let stub = StubPlatform::new();
        stub.respond_with(&[0x6e, 0x88, 0x02, 0x00, 0x10, 0x00, 0x00, 0x64, 0x00, 0x32, 0x92]);
        let service = I2cService::new(stub.clone());
        let handle = service.open_default(AllocatorToken::DEFAULT).unwrap();

        let mut first = [0u8; 11];
        let mut second = [0u8; 11];
        assert!(service.read(&handle, DDC, DDC_DATA, &mut first).is_success());
        assert!(service.read(&handle, DDC, DDC_DATA, &mut second).is_success());
        assert_eq!(first, second);
    }

    #[test]
    fn permanent_loss_then_single_release() {
        let stub = StubPlatform::new();
        stub.script_read(IoReturn::NO_DEVICE, &[]);
        let service = I2cService::new(stub.clone());
        let handle = service.open_default(AllocatorToken::DEFAULT).unwrap();

        let mut buf = [0u8; 8];
        let status = service.read(&handle, DDC, DDC_DATA, &mut buf);
        assert_eq!(status, IoReturn::NO_DEVICE);
        drop(handle);

        assert_eq!(stub.releases(), 1);
        stub.assert_balanced();
    }
}
