//! Parse linux rc keymaps and turn them into the initial scancode table of a device

use crate::keytable::{Entry, RcMap};
use evdev::Key;
use std::{collections::HashMap, str::FromStr};

mod parse;
mod protocol;

/// A Linux keymap, either toml or text format used by ir-keytable
#[derive(PartialEq, Eq, Debug, Default)]
pub struct Keymap {
    pub name: String,
    pub protocol: String,
    pub variant: Option<String>,
    pub rc_protocol: Option<u16>,
    pub scancodes: HashMap<u64, String>,
}

pub struct LinuxProtocol {
    pub name: &'static str,
    pub scancode_mask: u32,
    pub protocol_no: u32,
}

impl Keymap {
    /// Linux rc protocol number for this keymap, 0 if not known
    pub fn protocol_no(&self) -> u32 {
        if let Some(rc_protocol) = self.rc_protocol {
            return rc_protocol.into();
        }

        let protocol = self.variant.as_ref().unwrap_or(&self.protocol);

        LinuxProtocol::find_like(protocol)
            .map(|p| p.protocol_no)
            .unwrap_or(0)
    }

    /// Scancode table entries, sorted by scancode
    pub fn entries(&self) -> Result<Vec<Entry>, String> {
        let protocol = LinuxProtocol::find_like(self.variant.as_ref().unwrap_or(&self.protocol));

        let mut entries = self
            .scancodes
            .iter()
            .map(|(scancode, name)| {
                let Ok(scancode) = u32::try_from(*scancode) else {
                    return Err(format!("scancode {scancode:#x} is more than 32 bits"));
                };

                let Ok(keycode) = Key::from_str(name) else {
                    return Err(format!("‘{name}’ is not a valid keycode"));
                };

                if let Some(protocol) = protocol {
                    if scancode & !protocol.scancode_mask != 0 {
                        log::warn!(
                            "{}: scancode {scancode:#x} has bits outside protocol {} mask {:#x}",
                            self.name,
                            protocol.name,
                            protocol.scancode_mask
                        );
                    }
                }

                Ok(Entry {
                    scancode,
                    keycode,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        entries.sort_by_key(|e| e.scancode);

        Ok(entries)
    }
}

impl RcMap {
    /// Merge the protocols of a keymap file into a single map. The name and
    /// protocol come from the first entry
    pub fn from_keymaps(keymaps: &[Keymap]) -> Result<RcMap, String> {
        let Some(first) = keymaps.first() else {
            return Err("keymap has no protocols".into());
        };

        let mut scan = Vec::new();

        for keymap in keymaps {
            scan.extend(
                keymap
                    .entries()
                    .map_err(|e| format!("{}: {e}", keymap.name))?,
            );
        }

        Ok(RcMap {
            name: first.name.to_owned(),
            protocol: first.protocol_no(),
            scan,
        })
    }
}

#[test]
fn keymap_to_rc_map() {
    let keymap = Keymap {
        name: String::from("hauppauge"),
        protocol: String::from("rc5"),
        scancodes: HashMap::from([
            (0x1e3d, String::from("KEY_POWER2")),
            (0x1e1c, String::from("KEY_TV")),
            (0x1e3b, String::from("KEY_SELECT")),
        ]),
        ..Default::default()
    };

    assert_eq!(keymap.protocol_no(), 2);

    let map = RcMap::from_keymaps(&[keymap]).unwrap();

    assert_eq!(map.name, "hauppauge");
    assert_eq!(map.protocol, 2);
    assert_eq!(
        map.scan,
        vec![
            Entry {
                scancode: 0x1e1c,
                keycode: Key::KEY_TV
            },
            Entry {
                scancode: 0x1e3b,
                keycode: Key::KEY_SELECT
            },
            Entry {
                scancode: 0x1e3d,
                keycode: Key::KEY_POWER2
            },
        ]
    );
}

#[test]
fn keymap_errors() {
    let keymap = Keymap {
        name: String::from("bad"),
        protocol: String::from("nec"),
        rc_protocol: Some(100),
        scancodes: HashMap::from([(0x1_0000_0000, String::from("KEY_OK"))]),
        ..Default::default()
    };

    assert_eq!(keymap.protocol_no(), 100);
    assert_eq!(
        RcMap::from_keymaps(&[keymap]),
        Err("bad: scancode 0x100000000 is more than 32 bits".into())
    );

    let keymap = Keymap {
        name: String::from("bad"),
        protocol: String::from("foo"),
        scancodes: HashMap::from([(1, String::from("KEY_FOOBAR"))]),
        ..Default::default()
    };

    assert_eq!(keymap.protocol_no(), 0);
    assert_eq!(
        RcMap::from_keymaps(&[keymap]),
        Err("bad: ‘KEY_FOOBAR’ is not a valid keycode".into())
    );

    assert_eq!(
        RcMap::from_keymaps(&[]),
        Err("keymap has no protocols".into())
    );
}
