//! i2c-dev backend
//!
//! On Linux the DDC of a display is a regular I2C bus exposed by the graphics
//! driver. Device identifiers are those buses, discovered through udev.

use std::{
    ffi::OsStr,
    fmt::{self, Debug, Formatter},
    fs,
    io,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use i2cdev::{
    core::I2CTransfer,
    linux::{I2CMessage, LinuxI2CBus, LinuxI2CError, LinuxI2CMessage},
};
use log::{debug, trace, warn};

use super::{abi_len, AllocatorToken, AvPlatform, IoReturn};
use crate::ddc::eddc::I2C_DDC_7BIT_ADDRESS;

const ENXIO: i32 = 6;
const EAGAIN: i32 = 11;
const EBUSY: i32 = 16;
const ENODEV: i32 = 19;
const EREMOTEIO: i32 = 121;

/// An i2c-dev bus wired to a display connector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxDisplayBus {
    i2c_sysnum: usize,
    name: String,
}

impl LinuxDisplayBus {
    pub fn new(i2c_sysnum: usize, name: impl Into<String>) -> Self {
        Self {
            i2c_sysnum,
            name: name.into(),
        }
    }

    pub fn sysnum(&self) -> usize {
        self.i2c_sysnum
    }

    /// connector name like `DP-1`, or the adapter name for buses without a drm parent
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_path(&self) -> String {
        format!("/dev/i2c-{}", self.i2c_sysnum)
    }
}

/// An open i2c-dev file, shared between all retained aliases
#[derive(Clone)]
pub struct LinuxBusHandle {
    i2c_sysnum: usize,
    bus: Arc<Mutex<LinuxI2CBus>>,
}

impl LinuxBusHandle {
    fn lock(&self) -> MutexGuard<'_, LinuxI2CBus> {
        self.bus.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Debug for LinuxBusHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinuxBusHandle")
            .field("i2c_sysnum", &self.i2c_sysnum)
            .field("references", &Arc::strong_count(&self.bus))
            .finish()
    }
}

/// The i2c-dev implementation of [`AvPlatform`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxPlatform;

fn open_bus(device: &LinuxDisplayBus) -> Option<LinuxBusHandle> {
    match LinuxI2CBus::new(device.device_path()) {
        Ok(bus) => Some(LinuxBusHandle {
            i2c_sysnum: device.i2c_sysnum,
            bus: Arc::new(Mutex::new(bus)),
        }),
        Err(err) => {
            warn!("failed to open {}: {err}", device.device_path());
            None
        }
    }
}

impl AvPlatform for LinuxPlatform {
    type Device = LinuxDisplayBus;
    type Handle = LinuxBusHandle;

    /// the first display bus that can be opened, in sysnum order
    fn create(&self, _allocator: AllocatorToken) -> Option<LinuxBusHandle> {
        let buses = enumerate_display_buses()
            .map_err(|err| warn!("display bus enumeration failed: {err}"))
            .ok()?;
        buses.iter().find_map(open_bus)
    }

    fn create_with_service(
        &self,
        _allocator: AllocatorToken,
        device: &LinuxDisplayBus,
    ) -> Option<LinuxBusHandle> {
        open_bus(device)
    }

    fn read_i2c(
        &self,
        handle: &LinuxBusHandle,
        chip_address: u32,
        offset: u32,
        buf: &mut [u8],
    ) -> IoReturn {
        if abi_len(buf).is_none() {
            return IoReturn::BAD_ARGUMENT;
        }
        let (address, offset) = match bus_addressing(chip_address, offset) {
            Ok(addressing) => addressing,
            Err(status) => return status,
        };
        let mut bus = handle.lock();
        let result = if reads_without_offset(address) {
            let mut msgs = [LinuxI2CMessage::read(buf).with_address(address)];
            bus.transfer(&mut msgs)
        } else {
            let offset = [offset];
            let mut msgs = [
                LinuxI2CMessage::write(&offset).with_address(address),
                LinuxI2CMessage::read(buf).with_address(address),
            ];
            bus.transfer(&mut msgs)
        };
        match result {
            Ok(_) => IoReturn::SUCCESS,
            Err(err) => status_from_error(err),
        }
    }

    fn write_i2c(
        &self,
        handle: &LinuxBusHandle,
        chip_address: u32,
        data_address: u32,
        buf: &[u8],
    ) -> IoReturn {
        if abi_len(buf).is_none() {
            return IoReturn::BAD_ARGUMENT;
        }
        let (address, data_address) = match bus_addressing(chip_address, data_address) {
            Ok(addressing) => addressing,
            Err(status) => return status,
        };
        let mut data = Vec::with_capacity(buf.len() + 1);
        data.push(data_address);
        data.extend_from_slice(buf);
        let mut msgs = [LinuxI2CMessage::write(&data).with_address(address)];
        match handle.lock().transfer(&mut msgs) {
            Ok(_) => IoReturn::SUCCESS,
            Err(err) => status_from_error(err),
        }
    }

    fn retain(&self, handle: &LinuxBusHandle) -> LinuxBusHandle {
        handle.clone()
    }

    fn release(&self, handle: LinuxBusHandle) {
        drop(handle)
    }
}

/// Split the platform words into a 7 bit bus address and a one byte sub-address.
///
/// i2c-dev has no notion of wider sub-addresses, those are refused rather than
/// cut to their low byte.
fn bus_addressing(chip_address: u32, sub_address: u32) -> Result<(u16, u8), IoReturn> {
    let address = u16::try_from(chip_address)
        .ok()
        .filter(|address| *address <= 0x7f);
    match (address, u8::try_from(sub_address)) {
        (Some(address), Ok(sub_address)) => Ok((address, sub_address)),
        _ => {
            warn!("chip {chip_address:#x} sub-address {sub_address:#x} does not fit an i2c-dev transfer");
            Err(IoReturn::BAD_ARGUMENT)
        }
    }
}

// DDC/CI replies are fetched with a plain read, the display answers the
// last request instead of a register
fn reads_without_offset(address: u16) -> bool {
    address == u16::from(I2C_DDC_7BIT_ADDRESS)
}

fn status_from_error(err: LinuxI2CError) -> IoReturn {
    status_from_os_error(&io::Error::from(err))
}

/// map kernel errors onto the IOKit status catalogue
fn status_from_os_error(err: &io::Error) -> IoReturn {
    match err.kind() {
        io::ErrorKind::NotFound => IoReturn::NO_DEVICE,
        io::ErrorKind::PermissionDenied => IoReturn::NOT_PRIVILEGED,
        io::ErrorKind::TimedOut => IoReturn::TIMEOUT,
        io::ErrorKind::InvalidInput => IoReturn::BAD_ARGUMENT,
        io::ErrorKind::Unsupported => IoReturn::UNSUPPORTED,
        _ => match err.raw_os_error() {
            Some(ENXIO) | Some(ENODEV) => IoReturn::NO_DEVICE,
            Some(EBUSY) | Some(EAGAIN) => IoReturn::BUSY,
            // the chip did not acknowledge
            Some(EREMOTEIO) => IoReturn::NOT_RESPONDING,
            _ => IoReturn::IO_ERROR,
        },
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|content| content.trim().to_string())
}

// filter phantom devices, devices connected via docking stations may appear as two seperate
// i2c devices with only one working (workaround copied from ddcutil)
fn is_phantom_ddc_device(id: usize) -> bool {
    let device_path = Path::new("/sys/bus/i2c/devices").join(format!("i2c-{id}"));
    if !device_path.exists() {
        // it can not be a valid device if it is not found in the system tree
        return true;
    }
    let device = device_path.join("device");
    read_trimmed(&device.join("enabled")).is_some_and(|enabled| enabled == "disabled")
        && read_trimmed(&device.join("status")).is_some_and(|status| status == "disconnected")
}

// ignore devices that are probably not related to a monitor
fn ignore_device_by_name(name: &OsStr) -> bool {
    // list from ddcutil's ignorable_i2c_device_sysfs_name
    const SKIP_PREFIX: [&str; 5] = ["SMBus", "soc:i2cdsi", "smu", "mac-io", "u4"];

    name.to_str()
        .is_some_and(|name| SKIP_PREFIX.iter().any(|prefix| name.starts_with(prefix)))
}

// the bus sits below a drm connector or a pci display controller
fn device_is_display(dev: &udev::Device) -> bool {
    dev.parent()
        .and_then(|i2c_parent| i2c_parent.parent())
        .is_some_and(|graphics_device| {
            graphics_device
                .subsystem()
                .is_some_and(|subsystem| subsystem == "drm")
                || graphics_device
                    .property_value("ID_PCI_CLASS_FROM_DATABASE")
                    .is_some_and(|class| class == "Display controller")
        })
}

fn bus_name(dev: &udev::Device, id: usize) -> String {
    dev.parent()
        .and_then(|i2c_parent| i2c_parent.parent())
        .filter(|graphics_device| {
            graphics_device
                .subsystem()
                .is_some_and(|subsystem| subsystem == "drm")
        })
        .and_then(|drm_device| {
            // card0-DP-1 -> DP-1
            drm_device
                .sysname()
                .to_str()
                .and_then(|name| name.split_once('-'))
                .map(|(_, connector)| connector.to_string())
        })
        .or_else(|| {
            dev.attribute_value("name")
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| format!("i2c-{id}"))
}

/// Enumerate the i2c buses that are wired to a display, ordered by sysnum.
pub fn enumerate_display_buses() -> anyhow::Result<Vec<LinuxDisplayBus>> {
    let mut i2c_enum = udev::Enumerator::new()?;
    i2c_enum.match_subsystem("i2c-dev")?;

    let mut buses: Vec<LinuxDisplayBus> = i2c_enum
        .scan_devices()?
        .filter(|dev| {
            dev.attribute_value("name")
                .is_some_and(|name| !ignore_device_by_name(name))
        })
        .filter(|dev| device_is_display(dev))
        .filter_map(|dev| {
            let id = dev.sysnum()?;
            if is_phantom_ddc_device(id) {
                trace!("skipping phantom bus i2c-{id}");
                return None;
            }
            Some(LinuxDisplayBus::new(id, bus_name(&dev, id)))
        })
        .collect();
    buses.sort_by_key(|bus| bus.i2c_sysnum);

    for bus in &buses {
        debug!("found display bus {} ({})", bus.device_path(), bus.name);
    }
    Ok(buses)
}

#[cfg(test)]
mod test {
    use std::{ffi::OsStr, io};

    use super::{
        bus_addressing, ignore_device_by_name, reads_without_offset, status_from_os_error,
        LinuxDisplayBus,
    };
    use crate::{ddc::eddc::EDID_ADDRESS, service::IoReturn};

    #[test]
    fn kernel_errors_map_to_iokit_codes() {
        let cases = [
            (io::Error::from_raw_os_error(121), IoReturn::NOT_RESPONDING),
            (io::Error::from_raw_os_error(6), IoReturn::NO_DEVICE),
            (io::Error::from_raw_os_error(19), IoReturn::NO_DEVICE),
            (io::Error::from_raw_os_error(16), IoReturn::BUSY),
            (io::Error::from_raw_os_error(13), IoReturn::NOT_PRIVILEGED),
            (io::Error::from_raw_os_error(110), IoReturn::TIMEOUT),
            (io::Error::from_raw_os_error(5), IoReturn::IO_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(status_from_os_error(&err), status, "{err}");
        }
    }

    #[test]
    fn wide_sub_addresses_are_refused() {
        assert_eq!(bus_addressing(0x37, 0x51), Ok((0x37, 0x51)));
        assert_eq!(bus_addressing(0x37, 0xff), Ok((0x37, 0xff)));
        assert_eq!(bus_addressing(0x37, 0x100), Err(IoReturn::BAD_ARGUMENT));
        assert_eq!(bus_addressing(0x37, 0x1000), Err(IoReturn::BAD_ARGUMENT));
        assert_eq!(bus_addressing(0x37, 0x2000), Err(IoReturn::BAD_ARGUMENT));
        assert_eq!(bus_addressing(0x80, 0x00), Err(IoReturn::BAD_ARGUMENT));
        assert_eq!(bus_addressing(0x1_0037, 0x51), Err(IoReturn::BAD_ARGUMENT));
    }

    #[test]
    fn ddc_ci_replies_skip_the_offset_write() {
        assert!(reads_without_offset(0x37));
        assert!(!reads_without_offset(u16::from(EDID_ADDRESS)));
    }

    #[test]
    fn smbus_adapters_are_ignored() {
        assert!(ignore_device_by_name(OsStr::new("SMBus I801 adapter at efa0")));
        assert!(!ignore_device_by_name(OsStr::new("AMDGPU DM i2c hw bus 1")));
    }

    #[test]
    fn bus_device_path() {
        let bus = LinuxDisplayBus::new(4, "DP-1");
        assert_eq!(bus.device_path(), "/dev/i2c-4");
        assert_eq!(bus.name(), "DP-1");
    }
}
