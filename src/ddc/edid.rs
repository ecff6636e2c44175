//! EDID base block parsing
//!
//! Only the 128 byte base block is parsed, it is available on every display
//! and carries the identification data needed to tell displays apart.

use nom::bytes::complete::{tag, take};
use nom::combinator::peek;
use nom::multi::count;
use nom::number::complete::{be_u16, le_u16, le_u32, le_u8};
use nom::{IResult, Parser};
use thiserror::Error;

pub const EDID_BLOCK_LEN: usize = 128;

const EDID_HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];
const DESCRIPTOR_TEXT_LEN: usize = 13;

#[derive(Debug, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    pub vendor: [char; 3],
    pub product: u16,
    pub serial: u32,
    pub week: u8,
    pub year: u8, // Starting at year 1990
    pub version: u8,
    pub revision: u8,
}

impl Header {
    pub fn vendor_id(&self) -> String {
        self.vendor.iter().collect()
    }

    pub fn manufacture_year(&self) -> u16 {
        self.year as u16 + 1990
    }
}

// three 5 bit letters, 1 = 'A'
fn parse_vendor(v: u16) -> [char; 3] {
    let letter = |shift: u16| (((v >> shift) & 0x1f) as u8 + b'A' - 1) as char;
    [letter(10), letter(5), letter(0)]
}

fn parse_header(i: &[u8]) -> IResult<&[u8], Header> {
    let (i, _) = tag(&EDID_HEADER[..]).parse(i)?;
    let (i, vendor) = be_u16.parse(i)?;
    let (i, product) = le_u16.parse(i)?;
    let (i, serial) = le_u32.parse(i)?;
    let (i, week) = le_u8.parse(i)?;
    let (i, year) = le_u8.parse(i)?;
    let (i, version) = le_u8.parse(i)?;
    let (i, revision) = le_u8.parse(i)?;
    Ok((
        i,
        Header {
            vendor: parse_vendor(vendor),
            product,
            serial,
            week,
            year,
            version,
            revision,
        },
    ))
}

/// Basic display parameters
#[derive(Debug, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BasicDisplay {
    pub video_input: u8,
    pub width_cm: u8,
    pub height_cm: u8,
    /// (gamma * 100) - 100
    pub gamma: u8,
    pub features: u8,
}

impl BasicDisplay {
    pub fn is_digital(&self) -> bool {
        self.video_input & 0x80 != 0
    }

    pub fn gamma(&self) -> Option<f32> {
        // 0xff means the gamma is stored in an extension block
        (self.gamma != 0xff).then(|| (self.gamma as f32 + 100.) / 100.)
    }
}

fn parse_basic_display(i: &[u8]) -> IResult<&[u8], BasicDisplay> {
    let (i, video_input) = le_u8.parse(i)?;
    let (i, width_cm) = le_u8.parse(i)?;
    let (i, height_cm) = le_u8.parse(i)?;
    let (i, gamma) = le_u8.parse(i)?;
    let (i, features) = le_u8.parse(i)?;
    Ok((
        i,
        BasicDisplay {
            video_input,
            width_cm,
            height_cm,
            gamma,
            features,
        },
    ))
}

#[derive(Debug, PartialEq, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Descriptor {
    DetailedTiming {
        /// kHz
        pixel_clock: u32,
        horizontal_active: u16,
        vertical_active: u16,
    },
    SerialNumber(String),
    Text(String),
    ProductName(String),
    /// any other display descriptor, identified by its tag
    Other(u8),
}

fn descriptor_text(encoded: &[u8]) -> String {
    encoded
        .iter()
        .take_while(|b| **b != 0x0a)
        .map(|b| if b.is_ascii() { *b as char } else { '?' })
        .collect::<String>()
        .trim()
        .to_string()
}

fn parse_descriptor(i: &[u8]) -> IResult<&[u8], Descriptor> {
    let (i, pixel_clock) = peek(le_u16).parse(i)?;
    if pixel_clock != 0 {
        let (i, block) = take(18usize).parse(i)?;
        let horizontal_active = block[2] as u16 | ((block[4] >> 4) as u16) << 8;
        let vertical_active = block[5] as u16 | ((block[7] >> 4) as u16) << 8;
        return Ok((
            i,
            Descriptor::DetailedTiming {
                pixel_clock: pixel_clock as u32 * 10,
                horizontal_active,
                vertical_active,
            },
        ));
    }

    let (i, _reserved) = take(3usize).parse(i)?;
    let (i, descriptor_tag) = le_u8.parse(i)?;
    let (i, _reserved) = take(1usize).parse(i)?;
    let (i, payload) = take(DESCRIPTOR_TEXT_LEN).parse(i)?;
    let descriptor = match descriptor_tag {
        0xff => Descriptor::SerialNumber(descriptor_text(payload)),
        0xfe => Descriptor::Text(descriptor_text(payload)),
        0xfc => Descriptor::ProductName(descriptor_text(payload)),
        other => Descriptor::Other(other),
    };
    Ok((i, descriptor))
}

#[derive(Debug, PartialEq, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Edid {
    pub header: Header,
    pub display: BasicDisplay,
    pub descriptors: Vec<Descriptor>,
    /// number of extension blocks following the base block
    pub extensions: u8,
}

impl Edid {
    pub fn product_name(&self) -> Option<&str> {
        self.descriptors.iter().find_map(|d| match d {
            Descriptor::ProductName(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.descriptors.iter().find_map(|d| match d {
            Descriptor::SerialNumber(serial) => Some(serial.as_str()),
            _ => None,
        })
    }
}

// chromaticity, established and standard timings
fn skip_timings(i: &[u8]) -> IResult<&[u8], ()> {
    let (i, _) = take(10usize + 3 + 16).parse(i)?;
    Ok((i, ()))
}

/// Parse an EDID base block, `data` may contain trailing extension blocks.
pub fn parse_edid(data: &[u8]) -> Result<Edid, EdidParseError> {
    let block = data
        .get(..EDID_BLOCK_LEN)
        .ok_or(EdidParseError::Truncated(data.len()))?;
    if block.iter().fold(0u8, |sum, b| sum.wrapping_add(*b)) != 0 {
        return Err(EdidParseError::InvalidChecksum);
    }

    let (i, header) = parse_header(block)?;
    let (i, display) = parse_basic_display(i)?;
    let (i, _) = skip_timings(i)?;
    let (i, descriptors) = count(parse_descriptor, 4).parse(i)?;
    let (_i, extensions) = le_u8::<&[u8], nom::error::Error<_>>.parse(i)?;
    Ok(Edid {
        header,
        display,
        descriptors,
        extensions,
    })
}

#[derive(Error, Debug)]
pub enum EdidParseError {
    #[error("EDID block needs 128 bytes, got {0}")]
    Truncated(usize),
    #[error("Checksum is invalid, data corrupt!")]
    InvalidChecksum,
    #[error("Parsing data failed: {0}")]
    NomParserError(String),
}

impl<T> From<nom::Err<T>> for EdidParseError
where
    T: core::fmt::Debug,
{
    fn from(value: nom::Err<T>) -> Self {
        EdidParseError::NomParserError(format!("{value:?}"))
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::{parse_edid, Descriptor, EdidParseError, EDID_BLOCK_LEN};

    fn text_descriptor(tag: u8, text: &str) -> [u8; 18] {
        let mut d = [0x20u8; 18];
        d[..5].copy_from_slice(&[0, 0, 0, tag, 0]);
        let bytes = text.as_bytes();
        d[5..5 + bytes.len()].copy_from_slice(bytes);
        if bytes.len() < 13 {
            d[5 + bytes.len()] = 0x0a;
        }
        d
    }

    /// a DEL U2720Q style base block with a valid checksum
    pub(crate) fn fixture() -> [u8; EDID_BLOCK_LEN] {
        let mut edid = [0u8; EDID_BLOCK_LEN];
        edid[..8].copy_from_slice(&[0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
        // D=4 E=5 L=12
        edid[8..10].copy_from_slice(&[0x10, 0xac]);
        edid[10..12].copy_from_slice(&0xa0b1u16.to_le_bytes());
        edid[12..16].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        edid[16..20].copy_from_slice(&[10, 30, 1, 4]);
        edid[20..25].copy_from_slice(&[0xa5, 60, 34, 120, 0x3a]);
        // 1920x1080 @ 148.5 MHz
        let mut timing = [0u8; 18];
        timing[..8].copy_from_slice(&[0x02, 0x3a, 0x80, 0x18, 0x71, 0x38, 0x2d, 0x40]);
        edid[54..72].copy_from_slice(&timing);
        edid[72..90].copy_from_slice(&text_descriptor(0xfc, "DELL U2720Q"));
        edid[90..108].copy_from_slice(&text_descriptor(0xff, "ABC123"));
        edid[108..126].copy_from_slice(&text_descriptor(0xfd, ""));
        edid[126] = 1;
        let sum = edid[..127].iter().fold(0u8, |s, b| s.wrapping_add(*b));
        edid[127] = 0u8.wrapping_sub(sum);
        edid
    }

    #[test]
    fn parse_fixture() {
        let edid = parse_edid(&fixture()).unwrap();
        assert_eq!(edid.header.vendor_id(), "DEL");
        assert_eq!(edid.header.product, 0xa0b1);
        assert_eq!(edid.header.serial, 0x1234_5678);
        assert_eq!(edid.header.manufacture_year(), 2020);
        assert!(edid.display.is_digital());
        assert_eq!(edid.display.gamma(), Some(2.2));
        assert_eq!(
            edid.descriptors[0],
            Descriptor::DetailedTiming {
                pixel_clock: 148_500,
                horizontal_active: 1920,
                vertical_active: 1080,
            }
        );
        assert_eq!(edid.product_name(), Some("DELL U2720Q"));
        assert_eq!(edid.serial_number(), Some("ABC123"));
        assert_eq!(edid.descriptors[3], Descriptor::Other(0xfd));
        assert_eq!(edid.extensions, 1);
    }

    #[test]
    fn corrupt_checksum() {
        let mut data = fixture();
        data[20] ^= 0x01;
        assert!(matches!(
            parse_edid(&data),
            Err(EdidParseError::InvalidChecksum)
        ));
    }

    #[test]
    fn truncated_block() {
        let data = fixture();
        assert!(matches!(
            parse_edid(&data[..64]),
            Err(EdidParseError::Truncated(64))
        ));
    }

    #[test]
    fn bad_header() {
        let mut data = fixture();
        data[0] = 0x01;
        data[127] = data[127].wrapping_sub(1);
        assert!(matches!(
            parse_edid(&data),
            Err(EdidParseError::NomParserError(_))
        ));
    }
}
