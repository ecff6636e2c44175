//! Discovery of external displays in the IORegistry
//!
//! Each external display driven by the display coprocessor shows up as a
//! `DCPAVServiceProxy` entry in the IOService plane. The entry itself is the
//! device identifier expected by
//! [`I2cService::open_for_device`](crate::service::I2cService::open_for_device).

use std::ffi::{c_char, CStr};

use anyhow::{anyhow, bail};
use core_foundation::{
    base::{kCFAllocatorDefault, CFType, TCFType},
    dictionary::CFDictionary,
    number::CFNumber,
    string::CFString,
};
use log::{debug, trace, warn};

use super::{ffi, IoKitPlatform};
use crate::service::{AllocatorToken, AvService, I2cService, IoReturn};

const AV_SERVICE_PROXY: &str = "DCPAVServiceProxy";
const SERVICE_PLANE: &[u8] = b"IOService\0";
const EXTERNAL_LOCATION: &str = "External";

/// An owned reference on an IORegistry object
#[derive(Debug, PartialEq, Eq)]
pub struct RegistryEntry(ffi::io_object_t);

impl RegistryEntry {
    fn new(object: ffi::io_object_t) -> Option<Self> {
        (object != ffi::IO_OBJECT_NULL).then(|| RegistryEntry(object))
    }

    pub fn as_raw(&self) -> ffi::io_service_t {
        self.0
    }

    pub fn name(&self) -> Option<String> {
        let mut name = [0 as c_char; ffi::IO_NAME_LEN];
        // SAFETY: `name` has the size of an `io_name_t`
        let kr = unsafe { ffi::IORegistryEntryGetName(self.0, name.as_mut_ptr()) };
        if kr != ffi::KERN_SUCCESS {
            return None;
        }
        // SAFETY: IOKit null terminates the name within the buffer
        let name = unsafe { CStr::from_ptr(name.as_ptr()) };
        Some(name.to_string_lossy().into_owned())
    }

    fn property(&self, key: &str) -> Option<CFType> {
        let key = CFString::new(key);
        // SAFETY: the entry and key are alive for the call, the result follows the create rule
        let raw = unsafe {
            ffi::IORegistryEntryCreateCFProperty(
                self.0,
                key.as_concrete_TypeRef(),
                kCFAllocatorDefault,
                0,
            )
        };
        if raw.is_null() {
            None
        } else {
            Some(unsafe { CFType::wrap_under_create_rule(raw) })
        }
    }

    pub fn string_property(&self, key: &str) -> Option<String> {
        self.property(key)?
            .downcast::<CFString>()
            .map(|value| value.to_string())
    }

    /// `DisplayAttributes.ProductAttributes.<key>` as a string
    fn product_attribute(&self, key: &str) -> Option<String> {
        let attributes = self.property("DisplayAttributes")?.downcast::<CFDictionary>()?;
        let product = dictionary_value(&attributes, "ProductAttributes")?.downcast::<CFDictionary>()?;
        attribute_text(&dictionary_value(&product, key)?)
    }
}

impl Drop for RegistryEntry {
    fn drop(&mut self) {
        // SAFETY: releases the reference this entry owns
        unsafe { ffi::IOObjectRelease(self.0) };
    }
}

fn dictionary_value(dict: &CFDictionary, key: &str) -> Option<CFType> {
    let key = CFString::new(key);
    let value = dict.find(key.as_CFTypeRef())?;
    // SAFETY: values of a live dictionary are valid CF objects, the get rule retains
    Some(unsafe { CFType::wrap_under_get_rule(*value) })
}

/// Text of a string attribute, or the decimal value of a numeric one
fn attribute_text(value: &CFType) -> Option<String> {
    if let Some(text) = value.downcast::<CFString>() {
        return Some(text.to_string());
    }
    // some firmwares report numeric ids
    value
        .downcast::<CFNumber>()
        .and_then(|number| number.to_i64())
        .map(|number| number.to_string())
}

struct RegistryIterator(RegistryEntry);

impl Iterator for RegistryIterator {
    type Item = RegistryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: the iterator object is owned by `self`
        RegistryEntry::new(unsafe { ffi::IOIteratorNext(self.0.as_raw()) })
    }
}

/// An external display that can be opened for I2C transfers.
#[derive(Debug)]
pub struct DisplayService {
    pub entry: RegistryEntry,
    pub edid_uuid: String,
    pub product_name: String,
    pub manufacturer_id: String,
    pub location: String,
}

impl DisplayService {
    /// Open an AV service session bound to this display.
    pub fn open(&self, service: &I2cService<IoKitPlatform>) -> Option<AvService<IoKitPlatform>> {
        service.open_for_device(AllocatorToken::DEFAULT, &self.entry)
    }
}

/// List all external displays reachable through an AV service proxy.
///
/// Built-in panels are skipped, they do not answer on the DDC.
pub fn discover_display_services() -> anyhow::Result<Vec<DisplayService>> {
    // SAFETY: MACH_PORT_NULL selects the default main port
    let root = RegistryEntry::new(unsafe { ffi::IORegistryGetRootEntry(ffi::MACH_PORT_NULL) })
        .ok_or_else(|| anyhow!("IORegistry root entry is unavailable"))?;

    let mut iterator: ffi::io_iterator_t = ffi::IO_OBJECT_NULL;
    // SAFETY: the plane name is null terminated, `iterator` is a valid out pointer
    let kr = unsafe {
        ffi::IORegistryEntryCreateIterator(
            root.as_raw(),
            SERVICE_PLANE.as_ptr().cast(),
            ffi::kIORegistryIterateRecursively,
            &mut iterator,
        )
    };
    if kr != ffi::KERN_SUCCESS {
        bail!("failed to iterate the IOService plane: {}", IoReturn(kr));
    }
    let iterator = RegistryEntry::new(iterator)
        .map(RegistryIterator)
        .ok_or_else(|| anyhow!("IORegistry returned an empty iterator"))?;

    let mut services = Vec::new();
    for entry in iterator {
        let Some(name) = entry.name() else {
            continue;
        };
        if !name.contains(AV_SERVICE_PROXY) {
            continue;
        }
        let location = entry.string_property("Location").unwrap_or_default();
        if location != EXTERNAL_LOCATION {
            trace!("skipping {name} at location {location:?}");
            continue;
        }

        let service = DisplayService {
            edid_uuid: entry.string_property("EDID UUID").unwrap_or_default(),
            product_name: entry.product_attribute("ProductName").unwrap_or_default(),
            manufacturer_id: entry.product_attribute("ManufacturerID").unwrap_or_default(),
            location,
            entry,
        };
        debug!(
            "found display service {} ({}), EDID UUID {}",
            service.product_name, service.manufacturer_id, service.edid_uuid
        );
        services.push(service);
    }

    if services.is_empty() {
        warn!("no external display with an AV service found");
    }
    Ok(services)
}

#[cfg(test)]
mod test {
    use core_foundation::{
        base::TCFType, boolean::CFBoolean, number::CFNumber, string::CFString,
    };

    use super::attribute_text;

    #[test]
    fn attribute_text_of_strings_and_numbers() {
        let name = CFString::new("DELL U2720Q");
        assert_eq!(
            attribute_text(&name.as_CFType()).as_deref(),
            Some("DELL U2720Q")
        );

        let id = CFNumber::from(4268i32);
        assert_eq!(attribute_text(&id.as_CFType()).as_deref(), Some("4268"));

        assert_eq!(attribute_text(&CFBoolean::true_value().as_CFType()), None);
    }
}
