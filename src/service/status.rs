//! Platform return codes
//!
//! Transfers hand back the raw `IOReturn` value of the platform. On macOS this
//! is the value produced by the AV service itself, other backends map their
//! native errors onto the same catalogue so callers can classify statuses the
//! same way everywhere.

use std::fmt::{self, Display, Formatter};

/// `sys_iokit | sub_iokit_common`
const IOKIT_COMMON: u32 = 0xe000_0000;

const fn iokit_common_err(code: u32) -> IoReturn {
    IoReturn((IOKIT_COMMON | code) as i32)
}

/// Raw platform status, zero on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IoReturn(pub i32);

impl IoReturn {
    pub const SUCCESS: Self = IoReturn(0);
    pub const ERROR: Self = iokit_common_err(0x2bc);
    pub const NO_MEMORY: Self = iokit_common_err(0x2bd);
    pub const NO_RESOURCES: Self = iokit_common_err(0x2be);
    pub const NO_DEVICE: Self = iokit_common_err(0x2c0);
    pub const NOT_PRIVILEGED: Self = iokit_common_err(0x2c1);
    pub const BAD_ARGUMENT: Self = iokit_common_err(0x2c2);
    pub const EXCLUSIVE_ACCESS: Self = iokit_common_err(0x2c5);
    pub const UNSUPPORTED: Self = iokit_common_err(0x2c7);
    pub const IO_ERROR: Self = iokit_common_err(0x2ca);
    pub const NOT_OPEN: Self = iokit_common_err(0x2cd);
    pub const BUSY: Self = iokit_common_err(0x2d5);
    pub const TIMEOUT: Self = iokit_common_err(0x2d6);
    pub const OFFLINE: Self = iokit_common_err(0x2d7);
    pub const NOT_READY: Self = iokit_common_err(0x2d8);
    pub const NOT_ATTACHED: Self = iokit_common_err(0x2d9);
    pub const NOT_PERMITTED: Self = iokit_common_err(0x2e2);
    pub const NO_POWER: Self = iokit_common_err(0x2e3);
    pub const DEVICE_ERROR: Self = iokit_common_err(0x2e9);
    pub const ABORTED: Self = iokit_common_err(0x2eb);
    pub const NOT_RESPONDING: Self = iokit_common_err(0x2ed);
    pub const NOT_FOUND: Self = iokit_common_err(0x2f0);

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }

    /// The raw value as handed over by the platform
    pub fn code(&self) -> i32 {
        self.0
    }

    /// symbolic IOKit name of well known codes
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::SUCCESS => "kIOReturnSuccess",
            Self::ERROR => "kIOReturnError",
            Self::NO_MEMORY => "kIOReturnNoMemory",
            Self::NO_RESOURCES => "kIOReturnNoResources",
            Self::NO_DEVICE => "kIOReturnNoDevice",
            Self::NOT_PRIVILEGED => "kIOReturnNotPrivileged",
            Self::BAD_ARGUMENT => "kIOReturnBadArgument",
            Self::EXCLUSIVE_ACCESS => "kIOReturnExclusiveAccess",
            Self::UNSUPPORTED => "kIOReturnUnsupported",
            Self::IO_ERROR => "kIOReturnIOError",
            Self::NOT_OPEN => "kIOReturnNotOpen",
            Self::BUSY => "kIOReturnBusy",
            Self::TIMEOUT => "kIOReturnTimeout",
            Self::OFFLINE => "kIOReturnOffline",
            Self::NOT_READY => "kIOReturnNotReady",
            Self::NOT_ATTACHED => "kIOReturnNotAttached",
            Self::NOT_PERMITTED => "kIOReturnNotPermitted",
            Self::NO_POWER => "kIOReturnNoPower",
            Self::DEVICE_ERROR => "kIOReturnDeviceError",
            Self::ABORTED => "kIOReturnAborted",
            Self::NOT_RESPONDING => "kIOReturnNotResponding",
            Self::NOT_FOUND => "kIOReturnNotFound",
            _ => return None,
        };
        Some(name)
    }

    /// Sort the status into the coarse buckets a caller acts upon.
    ///
    /// Codes that are not known to be fatal are treated as transient, the
    /// platform has already retried them and the caller may re-issue the
    /// whole command.
    pub fn category(&self) -> StatusCategory {
        match *self {
            Self::SUCCESS => StatusCategory::Ok,
            Self::NOT_PRIVILEGED | Self::NOT_PERMITTED | Self::EXCLUSIVE_ACCESS => {
                StatusCategory::AccessDenied
            }
            Self::NO_DEVICE
            | Self::NOT_ATTACHED
            | Self::OFFLINE
            | Self::NOT_OPEN
            | Self::ABORTED
            | Self::NO_POWER => StatusCategory::Permanent,
            _ => StatusCategory::Transient,
        }
    }
}

impl From<i32> for IoReturn {
    fn from(value: i32) -> Self {
        IoReturn(value)
    }
}

impl From<IoReturn> for i32 {
    fn from(value: IoReturn) -> Self {
        value.0
    }
}

impl Display for IoReturn {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.0 as u32)?;
        if let Some(name) = self.name() {
            write!(f, " ({name})")?;
        }
        Ok(())
    }
}

/// Coarse classification of an [`IoReturn`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatusCategory {
    Ok,
    /// bus level failure that survived the platform retries
    Transient,
    /// the channel is gone, the handle has to be discarded
    Permanent,
    AccessDenied,
}

#[cfg(test)]
mod test {
    use super::{IoReturn, StatusCategory};

    #[test]
    fn iokit_code_values() {
        assert_eq!(IoReturn::ERROR.code() as u32, 0xe00002bc);
        assert_eq!(IoReturn::NO_DEVICE.code() as u32, 0xe00002c0);
        assert_eq!(IoReturn::NOT_RESPONDING.code() as u32, 0xe00002ed);
    }

    #[test]
    fn display_contains_name() {
        assert_eq!(
            IoReturn::NO_DEVICE.to_string(),
            "0xE00002C0 (kIOReturnNoDevice)"
        );
        assert_eq!(IoReturn(0x1234).to_string(), "0x00001234");
    }

    #[test]
    fn categories() {
        assert_eq!(IoReturn::SUCCESS.category(), StatusCategory::Ok);
        assert_eq!(IoReturn::TIMEOUT.category(), StatusCategory::Transient);
        assert_eq!(IoReturn::IO_ERROR.category(), StatusCategory::Transient);
        assert_eq!(IoReturn::OFFLINE.category(), StatusCategory::Permanent);
        assert_eq!(IoReturn::NO_DEVICE.category(), StatusCategory::Permanent);
        assert_eq!(
            IoReturn::NOT_PRIVILEGED.category(),
            StatusCategory::AccessDenied
        );
        assert_eq!(IoReturn(-1).category(), StatusCategory::Transient);
    }
}
