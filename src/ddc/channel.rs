use std::fmt::{self, Debug, Formatter};

use log::{debug, warn};

use super::{
    eddc::{EDID_ADDRESS, I2C_DDC_7BIT_ADDRESS, I2C_DDC_DATA_ADDRESS},
    edid::{parse_edid, Edid, EDID_BLOCK_LEN},
    I2cError,
};
use crate::service::{AvPlatform, AvService};

/// Conservative DDC bound, replies of DDC/CI commands are far shorter.
pub const DDC_MAX_TRANSFER: usize = 128;

/// Largest block the AV service moves in one operation
pub const MAX_BLOCK_TRANSFER: usize = 4096;

/// Upper bounds checked before a transfer reaches the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelLimits {
    /// bytes per [`DdcChannel::read`] or [`DdcChannel::write`]
    pub max_transfer: usize,
    /// bytes per block read or write
    pub max_block: usize,
}

impl Default for ChannelLimits {
    fn default() -> Self {
        Self {
            max_transfer: DDC_MAX_TRANSFER,
            max_block: MAX_BLOCK_TRANSFER,
        }
    }
}

fn check_len(len: usize, max: usize) -> Result<(), I2cError> {
    if len > max {
        warn!("rejecting transfer of {len} bytes, limit is {max}");
        return Err(I2cError::TransferTooLarge { len, max });
    }
    Ok(())
}

/// Byte level access to one display's DDC.
///
/// Owns the AV service session, dropping the channel releases it. Transfers
/// larger than the configured [`ChannelLimits`] are refused instead of being
/// truncated.
pub struct DdcChannel<P: AvPlatform> {
    service: AvService<P>,
    chip_address: u8,
    data_address: u8,
    limits: ChannelLimits,
}

impl<P> Debug for DdcChannel<P>
where
    P: AvPlatform,
    P::Handle: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DdcChannel")
            .field("service", &self.service)
            .field("chip_address", &self.chip_address)
            .field("data_address", &self.data_address)
            .field("limits", &self.limits)
            .finish()
    }
}

impl<P: AvPlatform> DdcChannel<P> {
    /// Channel to the DDC/CI address of the display.
    pub fn new(service: AvService<P>) -> Self {
        Self {
            service,
            chip_address: I2C_DDC_7BIT_ADDRESS,
            data_address: I2C_DDC_DATA_ADDRESS,
            limits: ChannelLimits::default(),
        }
    }

    pub fn with_addresses(mut self, chip_address: u8, data_address: u8) -> Self {
        self.chip_address = chip_address;
        self.data_address = data_address;
        self
    }

    pub fn with_limits(mut self, limits: ChannelLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn service(&self) -> &AvService<P> {
        &self.service
    }

    pub fn into_inner(self) -> AvService<P> {
        self.service
    }

    fn read_raw(&self, chip_address: u32, offset: u32, len: usize) -> Result<Vec<u8>, I2cError> {
        if len == 0 {
            return Err(I2cError::EmptyRead);
        }
        let mut buf = vec![0; len];
        let status = self.service.read_i2c(chip_address, offset, &mut buf);
        if !status.is_success() {
            warn!("I2C read from chip {chip_address:#04x} offset {offset:#04x} failed: {status}");
            return Err(I2cError::ReadFailed(status));
        }
        debug!("I2C read: {len} bytes from chip {chip_address:#04x}, offset {offset:#04x}");
        Ok(buf)
    }

    fn write_raw(&self, chip_address: u32, data_address: u32, data: &[u8]) -> Result<(), I2cError> {
        let status = self.service.write_i2c(chip_address, data_address, data);
        if !status.is_success() {
            warn!(
                "I2C write to chip {chip_address:#04x} data address {data_address:#x} failed: {status}"
            );
            return Err(I2cError::WriteFailed(status));
        }
        debug!(
            "I2C write: {} bytes to chip {chip_address:#04x}, data address {data_address:#x}",
            data.len()
        );
        Ok(())
    }

    /// Write `data` behind the channel's data address.
    pub fn write(&self, data: &[u8]) -> Result<(), I2cError> {
        check_len(data.len(), self.limits.max_transfer)?;
        self.write_raw(self.chip_address.into(), self.data_address.into(), data)
    }

    /// Read `len` bytes from the channel's data address.
    pub fn read(&self, len: usize) -> Result<Vec<u8>, I2cError> {
        self.read_at(self.data_address, len)
    }

    pub fn read_at(&self, offset: u8, len: usize) -> Result<Vec<u8>, I2cError> {
        check_len(len, self.limits.max_transfer)?;
        self.read_raw(self.chip_address.into(), offset.into(), len)
    }

    /// Write a block of scaler memory, `address` is passed as the sub-address word.
    pub fn write_block(&self, address: u32, data: &[u8]) -> Result<(), I2cError> {
        check_len(data.len(), self.limits.max_block)?;
        self.write_raw(self.chip_address.into(), address, data)
    }

    pub fn read_block(&self, address: u32, len: usize) -> Result<Vec<u8>, I2cError> {
        check_len(len, self.limits.max_block)?;
        self.read_raw(self.chip_address.into(), address, len)
    }

    /// Read back a block and compare it with `expected`.
    ///
    /// An empty `expected` block trivially matches and issues no transfer.
    pub fn verify_block(&self, address: u32, expected: &[u8]) -> Result<bool, I2cError> {
        if expected.is_empty() {
            return Ok(true);
        }
        let data = self.read_block(address, expected.len())?;
        let matches = data == expected;
        if !matches {
            warn!("block at {address:#x} does not match the expected data");
        }
        Ok(matches)
    }

    /// Read and parse the EDID base block of the display.
    pub fn read_edid(&self) -> Result<Edid, I2cError> {
        let data = self.read_raw(EDID_ADDRESS.into(), 0, EDID_BLOCK_LEN)?;
        Ok(parse_edid(&data)?)
    }
}
