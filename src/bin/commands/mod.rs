use super::Device;
use evdev::Key;
use ir_keytable::{
    input::InputSink,
    keymap::Keymap,
    keytable::RcMap,
    rcdev::{Config, DeviceProps, DriverType, RcDevice},
};
use std::sync::Arc;

pub mod replay;
pub mod show;

/// Hardware decoder which reports scancodes, possibly with missing bits
struct ScancodeDevice {
    scan_mask: u32,
}

impl DeviceProps for ScancodeDevice {
    fn driver_type(&self) -> DriverType {
        DriverType::Scancode
    }

    fn scan_mask(&self) -> u32 {
        self.scan_mask
    }
}

/// Print events to stdout
struct PrintEvents;

impl InputSink for PrintEvents {
    fn scan_observed(&self, scancode: u32) {
        println!("scan {scancode:#06x}");
    }

    fn key_down(&self, keycode: Key) {
        println!("keydown {keycode:?}");
    }

    fn key_up(&self, keycode: Key) {
        println!("keyup {keycode:?}");
    }
}

fn load_keymap(device: &Device) -> RcMap {
    let Some(path) = &device.keymap else {
        return RcMap {
            name: String::from("rc-empty"),
            protocol: 0,
            scan: Vec::new(),
        };
    };

    let keymaps = match Keymap::parse(path) {
        Ok(keymaps) => keymaps,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    match RcMap::from_keymaps(&keymaps) {
        Ok(map) => map,
        Err(e) => {
            log::error!("{}: {e}", path.display());
            std::process::exit(1);
        }
    }
}

fn register(device: &Device, config: Config) -> RcDevice {
    let map = load_keymap(device);

    let props: Box<dyn DeviceProps> = Box::new(ScancodeDevice {
        scan_mask: device.scan_mask.unwrap_or(0),
    });

    match RcDevice::register(&map, Some(props), "rc0", Arc::new(PrintEvents), config) {
        Ok(dev) => dev,
        Err(e) => {
            log::error!("{}: {e}", map.name);
            std::process::exit(1);
        }
    }
}
