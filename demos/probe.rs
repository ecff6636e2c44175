//! Example listing attached displays and their EDID identification

use avi2c::DdcChannel;

#[cfg(target_os = "macos")]
fn main() -> anyhow::Result<()> {
    use avi2c::service::mac_os::discover_display_services;

    let service = avi2c::I2cService::native();
    for display in discover_display_services()? {
        println!("{} ({})", display.product_name, display.manufacturer_id);
        let Some(handle) = display.open(&service) else {
            println!("  AV service could not be opened");
            continue;
        };
        match DdcChannel::new(handle).read_edid() {
            Ok(edid) => println!("  EDID: {edid:#?}"),
            Err(err) => println!("  EDID read failed: {err}"),
        }
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn main() -> anyhow::Result<()> {
    use avi2c::{service::linux::enumerate_display_buses, AllocatorToken};

    let service = avi2c::I2cService::native();
    for bus in enumerate_display_buses()? {
        println!("{} ({})", bus.name(), bus.device_path());
        let Some(handle) = service.open_for_device(AllocatorToken::DEFAULT, &bus) else {
            println!("  bus could not be opened");
            continue;
        };
        match DdcChannel::new(handle).read_edid() {
            Ok(edid) => println!("  EDID: {edid:#?}"),
            Err(err) => println!("  EDID read failed: {err}"),
        }
    }
    Ok(())
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn main() {}
