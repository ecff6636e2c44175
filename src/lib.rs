//! I2C over the Display Data Channel
//!
//! Thin access layer to the host's AV service: open a session on a display's
//! control channel, then read and write raw bytes against a chip address.
//! DDC/CI framing, VCP commands and retry policies are expected to live in
//! the caller.
//!
//! ```no_run
//! # #[cfg(any(target_os = "macos", target_os = "linux"))]
//! # fn main() {
//! use avi2c::ddc::eddc::{I2C_DDC_7BIT_ADDRESS, I2C_DDC_DATA_ADDRESS};
//! use avi2c::service::{AllocatorToken, I2cService};
//!
//! let service = I2cService::native();
//! if let Some(handle) = service.open_default(AllocatorToken::DEFAULT) {
//!     let mut reply = [0u8; 11];
//!     let status = service.read(
//!         &handle,
//!         I2C_DDC_7BIT_ADDRESS.into(),
//!         I2C_DDC_DATA_ADDRESS.into(),
//!         &mut reply,
//!     );
//!     println!("{status}: {reply:02x?}");
//! }
//! # }
//! # #[cfg(not(any(target_os = "macos", target_os = "linux")))]
//! # fn main() {}
//! ```

pub mod ddc;
pub mod service;

pub use ddc::{
    channel::{ChannelLimits, DdcChannel},
    eddc::{I2C_DDC_7BIT_ADDRESS, I2C_DDC_DATA_ADDRESS},
    I2cError,
};
pub use service::{AllocatorToken, AvPlatform, AvService, I2cService, IoReturn, StatusCategory};

#[cfg(target_os = "linux")]
pub type NativeService = I2cService<service::linux::LinuxPlatform>;
#[cfg(target_os = "macos")]
pub type NativeService = I2cService<service::mac_os::IoKitPlatform>;
