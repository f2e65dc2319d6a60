//! A remote controller device: the scancode table, the key press state and
//! the properties of the driver behind it.

use crate::{
    input::{is_valid_keycode, InputSink},
    keypress::{Keypress, KEYPRESS_TIMEOUT},
    keytable::{Entry, Mapping, RcMap, ScancodeTable},
    Error,
};
use bitflags::bitflags;
use evdev::{AttributeSet, Key};
use log::{debug, info, trace};
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

/// How the driver delivers infrared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverType {
    /// Driver delivers pulse and space durations, decoded in software
    IrRaw,
    /// Hardware decoder which delivers scancodes
    Scancode,
}

bitflags! {
    /// Optional operations a driver supports
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const OPEN = 1;
        const CLOSE = 2;
    }
}

/// Properties of the driver behind a device
pub trait DeviceProps: Send + Sync {
    fn driver_type(&self) -> DriverType;

    /// Some hardware decoders do not provide all bits of the scancode, usually
    /// only the command part. Zero means the full scancode is available
    fn scan_mask(&self) -> u32 {
        0
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    fn open(&self) -> Result<(), String> {
        Ok(())
    }

    fn close(&self) {}
}

/// Settings for a device
#[derive(Debug, Clone)]
pub struct Config {
    /// How long after the last scancode a key is released
    pub keypress_timeout: Duration,
    /// Add received scancodes which are not in the table yet, with no keycode
    pub learn_scancodes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            keypress_timeout: KEYPRESS_TIMEOUT,
            learn_scancodes: true,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeymapFlags: u8 {
        /// Address the entry by index rather than by scancode
        const BY_INDEX = 1;
    }
}

/// A get or set keycode request, like `struct input_keymap_entry`
#[derive(Debug, Clone, PartialEq)]
pub struct KeymapEntry {
    pub flags: KeymapFlags,
    pub index: usize,
    /// Scancode in native byte order; 1, 2 or 4 bytes
    pub scancode: Vec<u8>,
    pub keycode: Key,
}

impl Default for KeymapEntry {
    fn default() -> Self {
        KeymapEntry {
            flags: KeymapFlags::empty(),
            index: 0,
            scancode: Vec::new(),
            keycode: Key::KEY_RESERVED,
        }
    }
}

impl KeymapEntry {
    pub fn by_index(index: usize, keycode: Key) -> Self {
        KeymapEntry {
            flags: KeymapFlags::BY_INDEX,
            index,
            scancode: Vec::new(),
            keycode,
        }
    }

    pub fn by_scancode(scancode: u32, keycode: Key) -> Self {
        KeymapEntry {
            flags: KeymapFlags::empty(),
            index: 0,
            scancode: scancode.to_ne_bytes().to_vec(),
            keycode,
        }
    }

    fn scancode(&self) -> Result<u32, Error> {
        match *self.scancode.as_slice() {
            [b] => Ok(b as u32),
            [b0, b1] => Ok(u16::from_ne_bytes([b0, b1]) as u32),
            [b0, b1, b2, b3] => Ok(u32::from_ne_bytes([b0, b1, b2, b3])),
            _ => Err(Error::InvalidArgument),
        }
    }
}

struct Keytable {
    table: ScancodeTable,
    keybits: AttributeSet<Key>,
}

/// A registered remote controller device
pub struct RcDevice {
    driver_name: String,
    props: Option<Box<dyn DeviceProps>>,
    config: Config,
    keytable: Mutex<Keytable>,
    keypress: Keypress,
}

impl RcDevice {
    /// Register a device and load its initial keymap
    pub fn register(
        map: &RcMap,
        props: Option<Box<dyn DeviceProps>>,
        driver_name: &str,
        sink: Arc<dyn InputSink>,
        config: Config,
    ) -> Result<RcDevice, Error> {
        if Instant::now().checked_add(config.keypress_timeout).is_none() {
            debug!(
                "{driver_name}: keypress timeout {:?} is too large",
                config.keypress_timeout
            );
            return Err(Error::InvalidArgument);
        }

        let scan_mask = props.as_ref().map(|p| p.scan_mask()).unwrap_or(0);

        let mut keybits = AttributeSet::<Key>::new();
        let table = ScancodeTable::from_map(map, scan_mask, &mut keybits)?;

        let keypress =
            Keypress::new(driver_name, sink, config.keypress_timeout).map_err(|e| {
                debug!("{driver_name}: cannot start keyup timer: {e}");
                Error::OutOfMemory
            })?;

        info!(
            "registered input device on {driver_name} for {} remote{}",
            map.name,
            if props.as_ref().map(|p| p.driver_type()) == Some(DriverType::IrRaw) {
                " in raw mode"
            } else {
                ""
            }
        );

        Ok(RcDevice {
            driver_name: driver_name.to_owned(),
            props,
            config,
            keytable: Mutex::new(Keytable { table, keybits }),
            keypress,
        })
    }

    /// Unregister the device. Any key held down is released
    pub fn unregister(self) {
        debug!("{}: unregistering", self.driver_name);
    }

    fn teardown(&mut self) {
        self.keypress.shutdown();
        self.keytable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .table
            .destroy();
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn driver_type(&self) -> Option<DriverType> {
        self.props.as_ref().map(|p| p.driver_type())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Called when the first user opens the input device
    pub fn open(&self) -> Result<(), String> {
        match &self.props {
            Some(props) if props.capabilities().contains(Capabilities::OPEN) => props.open(),
            _ => Ok(()),
        }
    }

    /// Called when the last user closes the input device
    pub fn close(&self) {
        if let Some(props) = &self.props {
            if props.capabilities().contains(Capabilities::CLOSE) {
                props.close();
            }
        }
    }

    /// Get a mapping by index or by scancode
    pub fn get_keycode(&self, ke: &KeymapEntry) -> Result<Mapping, Error> {
        let keytable = self.keytable.lock().unwrap();

        if ke.flags.contains(KeymapFlags::BY_INDEX) {
            let entry = keytable.table.get_entry(ke.index)?;

            Ok(Mapping {
                index: Some(ke.index),
                scancode: entry.scancode,
                keycode: entry.keycode,
            })
        } else {
            Ok(keytable.table.get_entry_by_scancode(ke.scancode()?))
        }
    }

    /// Set a mapping by index or by scancode. Setting the keycode to
    /// [`Key::KEY_RESERVED`] removes the mapping. Returns the previous keycode
    pub fn set_keycode(&self, ke: &KeymapEntry) -> Result<Key, Error> {
        if !is_valid_keycode(ke.keycode) {
            return Err(Error::InvalidArgument);
        }

        let mut keytable = self.keytable.lock().unwrap();
        let Keytable { table, keybits } = &mut *keytable;

        let index = if ke.flags.contains(KeymapFlags::BY_INDEX) {
            ke.index
        } else {
            table.establish(ke.scancode()?, true)?
        };

        table.update_mapping(index, ke.keycode, keybits)
    }

    /// Keycode a scancode maps to, [`Key::KEY_RESERVED`] if none. With
    /// scancode learning enabled, unseen scancodes are added to the table
    pub fn keycode_from_table(&self, scancode: u32) -> Key {
        let mut keytable = self.keytable.lock().unwrap();
        let table = &mut keytable.table;

        if let Some(index) = table.lookup(scancode) {
            let keycode = table.entries()[index].keycode;

            trace!(
                "{}: scancode {scancode:#06x} keycode {keycode:?}",
                self.driver_name
            );

            return keycode;
        }

        if self.config.learn_scancodes {
            if let Err(e) = table.establish(scancode, true) {
                debug!(
                    "{}: cannot add scancode {scancode:#06x}: {e}",
                    self.driver_name
                );
            }
        }

        Key::KEY_RESERVED
    }

    /// A decoder received a scancode
    pub fn keydown(&self, scancode: u32, toggle: u8) {
        // table lock is released before the key state is touched
        let keycode = self.keycode_from_table(scancode);

        self.keypress.keydown(scancode, toggle, keycode);
    }

    /// A decoder received a repeat message without the scancode
    pub fn repeat(&self) {
        self.keypress.repeat();
    }

    /// Release the current key immediately
    pub fn keyup(&self) {
        self.keypress.keyup();
    }

    pub fn pressed_key(&self) -> Option<Key> {
        self.keypress.pressed_key()
    }

    /// Copy of the current mappings, sorted by scancode
    pub fn entries(&self) -> Vec<Entry> {
        self.keytable.lock().unwrap().table.entries().to_vec()
    }

    /// Keycodes some scancode maps to
    pub fn supported_keys(&self) -> Vec<Key> {
        self.keytable.lock().unwrap().keybits.iter().collect()
    }

    /// Name and protocol of the keymap, number of entries and number of entries
    /// there is room for
    pub fn table_info(&self) -> (String, u32, usize, usize) {
        let keytable = self.keytable.lock().unwrap();

        (
            keytable.table.name().to_owned(),
            keytable.table.protocol(),
            keytable.table.len(),
            keytable.table.size(),
        )
    }
}

impl Drop for RcDevice {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputEvent;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc::{self, Receiver},
        },
        time::Instant,
    };

    fn empty_map() -> RcMap {
        RcMap {
            name: String::from("rc-empty"),
            protocol: 0,
            scan: Vec::new(),
        }
    }

    fn register(
        map: &RcMap,
        props: Option<Box<dyn DeviceProps>>,
        config: Config,
    ) -> (RcDevice, Receiver<InputEvent>) {
        let (tx, rx) = mpsc::channel::<InputEvent>();

        let dev = RcDevice::register(map, props, "rc0", Arc::new(tx), config).unwrap();

        (dev, rx)
    }

    #[test]
    fn end_to_end() {
        let config = Config {
            keypress_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let (dev, rx) = register(&empty_map(), None, config);

        assert_eq!(
            dev.table_info(),
            (String::from("rc-empty"), 0, 0, 32)
        );

        dev.keydown(0x10, 0);
        assert_eq!(rx.recv().unwrap(), InputEvent::Scan(0x10));
        assert_eq!(
            dev.entries(),
            vec![Entry {
                scancode: 0x10,
                keycode: Key::KEY_RESERVED
            }]
        );
        assert_eq!(dev.pressed_key(), None);

        assert_eq!(
            dev.set_keycode(&KeymapEntry::by_scancode(0x10, Key::KEY_A)),
            Ok(Key::KEY_RESERVED)
        );
        assert_eq!(
            dev.get_keycode(&KeymapEntry::by_scancode(0x10, Key::KEY_RESERVED)),
            Ok(Mapping {
                index: Some(0),
                scancode: 0x10,
                keycode: Key::KEY_A
            })
        );
        assert_eq!(dev.supported_keys(), vec![Key::KEY_A]);

        let start = Instant::now();
        dev.keydown(0x10, 0);
        assert_eq!(rx.recv().unwrap(), InputEvent::Scan(0x10));
        assert_eq!(rx.recv().unwrap(), InputEvent::KeyDown(Key::KEY_A));

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            InputEvent::KeyUp(Key::KEY_A)
        );
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn no_learning() {
        let config = Config {
            learn_scancodes: false,
            ..Default::default()
        };
        let (dev, rx) = register(&empty_map(), None, config);

        dev.keydown(0x10, 0);

        assert_eq!(rx.recv().unwrap(), InputEvent::Scan(0x10));
        assert!(dev.entries().is_empty());
    }

    #[test]
    fn management() {
        let map = RcMap {
            name: String::from("rc-hauppauge"),
            protocol: 2,
            scan: vec![
                Entry {
                    scancode: 0x1e3d,
                    keycode: Key::KEY_POWER2,
                },
                Entry {
                    scancode: 0x1e3b,
                    keycode: Key::KEY_SELECT,
                },
            ],
        };
        let (dev, _rx) = register(&map, None, Config::default());

        assert_eq!(
            dev.get_keycode(&KeymapEntry::by_index(1, Key::KEY_RESERVED)),
            Ok(Mapping {
                index: Some(1),
                scancode: 0x1e3d,
                keycode: Key::KEY_POWER2
            })
        );
        assert_eq!(
            dev.get_keycode(&KeymapEntry::by_index(2, Key::KEY_RESERVED)),
            Err(Error::OutOfRange)
        );
        assert_eq!(
            dev.get_keycode(&KeymapEntry::by_scancode(0x1e00, Key::KEY_RESERVED)),
            Ok(Mapping {
                index: None,
                scancode: 0x1e00,
                keycode: Key::KEY_RESERVED
            })
        );

        // 16 bit scancode
        let ke = KeymapEntry {
            scancode: 0x1e3bu16.to_ne_bytes().to_vec(),
            ..Default::default()
        };
        assert_eq!(dev.get_keycode(&ke).unwrap().keycode, Key::KEY_SELECT);

        // no scancode given
        assert_eq!(
            dev.get_keycode(&KeymapEntry::default()),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            dev.set_keycode(&KeymapEntry {
                scancode: vec![1, 2, 3],
                keycode: Key::KEY_A,
                ..Default::default()
            }),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            dev.set_keycode(&KeymapEntry::by_scancode(1, Key::new(0x300))),
            Err(Error::InvalidArgument)
        );

        assert_eq!(
            dev.set_keycode(&KeymapEntry::by_index(5, Key::KEY_A)),
            Err(Error::OutOfRange)
        );
        assert_eq!(
            dev.set_keycode(&KeymapEntry::by_index(0, Key::KEY_OK)),
            Ok(Key::KEY_SELECT)
        );
        assert_eq!(
            dev.set_keycode(&KeymapEntry::by_index(1, Key::KEY_RESERVED)),
            Ok(Key::KEY_POWER2)
        );
        assert_eq!(
            dev.entries(),
            vec![Entry {
                scancode: 0x1e3b,
                keycode: Key::KEY_OK
            }]
        );
        assert_eq!(dev.supported_keys(), vec![Key::KEY_OK]);
    }

    #[test]
    fn capacity_exhausted() {
        let (dev, _rx) = register(&empty_map(), None, Config::default());

        for scancode in 0..1024 {
            dev.set_keycode(&KeymapEntry::by_scancode(scancode, Key::KEY_A))
                .unwrap();
        }

        assert_eq!(
            dev.set_keycode(&KeymapEntry::by_scancode(5000, Key::KEY_B)),
            Err(Error::CapacityExhausted)
        );

        // receiving an unknown scancode with a full table is not an error
        dev.keydown(5000, 0);
        assert_eq!(dev.entries().len(), 1024);
        assert_eq!(dev.pressed_key(), None);
    }

    struct Props {
        opened: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    impl DeviceProps for Props {
        fn driver_type(&self) -> DriverType {
            DriverType::Scancode
        }

        fn scan_mask(&self) -> u32 {
            0xff
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::OPEN
        }

        fn open(&self) -> Result<(), String> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn props() {
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let map = RcMap {
            name: String::from("rc-cinergy"),
            protocol: 0,
            scan: vec![Entry {
                scancode: 0x0401,
                keycode: Key::KEY_1,
            }],
        };

        let props = Props {
            opened: opened.clone(),
            closed: closed.clone(),
        };

        let (dev, rx) = register(&map, Some(Box::new(props)), Config::default());

        assert_eq!(dev.driver_type(), Some(DriverType::Scancode));

        dev.open().unwrap();
        dev.close();
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        // close capability not advertised
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        // hardware only reports the command byte
        dev.keydown(0x01, 0);
        assert_eq!(rx.recv().unwrap(), InputEvent::Scan(0x01));
        assert_eq!(rx.recv().unwrap(), InputEvent::KeyDown(Key::KEY_1));
    }

    #[test]
    fn unregister_releases() {
        let map = RcMap {
            name: String::from("rc-test"),
            protocol: 0,
            scan: vec![Entry {
                scancode: 0x10,
                keycode: Key::KEY_A,
            }],
        };
        let (dev, rx) = register(&map, None, Config::default());

        dev.keydown(0x10, 0);
        dev.unregister();

        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![
                InputEvent::Scan(0x10),
                InputEvent::KeyDown(Key::KEY_A),
                InputEvent::KeyUp(Key::KEY_A),
            ]
        );
    }

    #[test]
    fn huge_timeout() {
        let (tx, _rx) = mpsc::channel::<InputEvent>();

        let config = Config {
            keypress_timeout: Duration::MAX,
            ..Default::default()
        };

        assert!(matches!(
            RcDevice::register(&empty_map(), None, "rc0", Arc::new(tx), config),
            Err(Error::InvalidArgument)
        ));

        // a long but representable timeout works
        let config = Config {
            keypress_timeout: Duration::from_secs(86400 * 365),
            ..Default::default()
        };
        let (dev, rx) = register(&empty_map(), None, config);

        dev.set_keycode(&KeymapEntry::by_scancode(0x10, Key::KEY_A))
            .unwrap();
        dev.keydown(0x10, 0);
        dev.repeat();
        dev.unregister();

        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![
                InputEvent::Scan(0x10),
                InputEvent::KeyDown(Key::KEY_A),
                InputEvent::Scan(0x10),
                InputEvent::KeyUp(Key::KEY_A),
            ]
        );
    }

    #[test]
    fn nul_in_driver_name() {
        let (tx, rx) = mpsc::channel::<InputEvent>();

        let dev =
            RcDevice::register(&empty_map(), None, "rc\0x", Arc::new(tx), Config::default())
                .unwrap();

        assert_eq!(dev.driver_name(), "rc\0x");

        dev.keydown(0x10, 0);
        assert_eq!(rx.recv().unwrap(), InputEvent::Scan(0x10));
    }

    /// Panics when releasing a key from the keyup timer thread
    struct FailingSink;

    impl InputSink for FailingSink {
        fn scan_observed(&self, _scancode: u32) {}

        fn key_down(&self, _key: Key) {}

        fn key_up(&self, _key: Key) {
            if std::thread::current().name() == Some("rc0-keyup") {
                panic!("input sink failed");
            }
        }
    }

    #[test]
    fn sink_panic_on_timer_thread() {
        let map = RcMap {
            name: String::from("rc-test"),
            protocol: 0,
            scan: vec![Entry {
                scancode: 0x10,
                keycode: Key::KEY_A,
            }],
        };

        let config = Config {
            keypress_timeout: Duration::from_millis(10),
            ..Default::default()
        };

        let dev =
            RcDevice::register(&map, None, "rc0", Arc::new(FailingSink), config).unwrap();

        dev.keydown(0x10, 0);

        // the timer thread panics in the sink with the key state locked
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(dev.pressed_key(), None);

        // teardown copes with the poisoned lock and the dead timer thread
        dev.unregister();
    }

    #[test]
    fn bad_map() {
        let (tx, _rx) = mpsc::channel::<InputEvent>();

        let map = RcMap {
            name: String::from("rc-test"),
            protocol: 0,
            scan: vec![Entry {
                scancode: 0x10,
                keycode: Key::new(0x1000),
            }],
        };

        assert!(matches!(
            RcDevice::register(&map, None, "rc0", Arc::new(tx), Config::default()),
            Err(Error::InvalidArgument)
        ));
    }
}
