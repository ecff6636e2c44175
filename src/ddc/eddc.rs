//! DDC address registry
//!
//! Well known I2C addresses of a display's DDC as defined by VESA DDC/CI and
//! E-DDC. All addresses are 7-bit.

/// DDC/CI target address of every compliant display
pub const I2C_DDC_7BIT_ADDRESS: u8 = 0x37;

/// Sub-address at which DDC/CI frames are written and replies are read
pub const I2C_DDC_DATA_ADDRESS: u8 = 0x51;

pub const EDDC_SEGMENT_POINTER_ADDR: u8 = 0x30;

pub const EDID_ADDRESS: u8 = 0x50;
pub const DISPLAY_ID_ADDRESS: u8 = 0x52;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn vesa_addresses() {
        assert_eq!(I2C_DDC_7BIT_ADDRESS, 0x37);
        assert_eq!(I2C_DDC_DATA_ADDRESS, 0x51);
        // 8-bit write address of the display
        assert_eq!(I2C_DDC_7BIT_ADDRESS << 1, 0x6e);
        assert_eq!(EDID_ADDRESS << 1, 0xa0);
    }
}
