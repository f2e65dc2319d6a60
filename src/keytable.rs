//! Scancode to keycode table of a single remote controller device. The table
//! is kept sorted by scancode so lookups from the receive path are a binary
//! search. Storage grows and shrinks in powers of two between
//! [`TABLE_MIN_SIZE`] and [`TABLE_MAX_SIZE`] bytes.

use crate::{
    input::{is_unmapped, is_valid_keycode, KeyBits},
    Error,
};
use evdev::Key;
use log::{debug, trace};
use std::mem;

/// Smallest table allocation in bytes; 256 bytes allows for 32 entries
pub const TABLE_MIN_SIZE: usize = 256;
/// Largest table allocation in bytes
pub const TABLE_MAX_SIZE: usize = 8192;

const ENTRY_SIZE: usize = mem::size_of::<Entry>();

/// Fewest entries a table has room for
pub const MIN_CAPACITY: usize = TABLE_MIN_SIZE / ENTRY_SIZE;
/// Most entries a table can hold
pub const MAX_CAPACITY: usize = TABLE_MAX_SIZE / ENTRY_SIZE;

/// A single scancode mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub scancode: u32,
    pub keycode: Key,
}

/// Initial set of mappings for a device
#[derive(Debug, Clone, PartialEq)]
pub struct RcMap {
    pub name: String,
    /// Linux rc protocol number
    pub protocol: u32,
    /// Mappings in any order. Later entries replace earlier ones with the same scancode
    pub scan: Vec<Entry>,
}

/// Result of looking up a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// Position in the table, None if the scancode has no entry
    pub index: Option<usize>,
    pub scancode: u32,
    pub keycode: Key,
}

#[derive(Debug)]
pub struct ScancodeTable {
    name: String,
    protocol: u32,
    scan_mask: u32,
    /// Allocated size in bytes, zero once destroyed
    alloc: usize,
    scan: Vec<Entry>,
}

impl ScancodeTable {
    /// Create an empty table with room for at least `size` entries
    pub fn new(name: &str, protocol: u32, size: usize) -> Result<Self, Error> {
        let alloc = size
            .checked_mul(ENTRY_SIZE)
            .and_then(usize::checked_next_power_of_two)
            .unwrap_or(TABLE_MAX_SIZE)
            .clamp(TABLE_MIN_SIZE, TABLE_MAX_SIZE);

        let mut scan = Vec::new();
        if scan.try_reserve_exact(alloc / ENTRY_SIZE).is_err() {
            debug!("failed to allocate {alloc} bytes for table {name}");
            return Err(Error::OutOfMemory);
        }

        debug!(
            "allocated space for {} keycode entries ({alloc} bytes)",
            alloc / ENTRY_SIZE
        );

        Ok(ScancodeTable {
            name: name.to_owned(),
            protocol,
            scan_mask: 0,
            alloc,
            scan,
        })
    }

    /// Create a table and populate it from an initial map. If any entry cannot
    /// be added, the table is torn down and the error returned.
    pub fn from_map(
        map: &RcMap,
        scan_mask: u32,
        keybits: &mut impl KeyBits,
    ) -> Result<Self, Error> {
        let mut table = ScancodeTable::new(&map.name, map.protocol, map.scan.len())?;
        table.set_scan_mask(scan_mask);

        for entry in &map.scan {
            let res = if is_valid_keycode(entry.keycode) {
                table
                    .establish(entry.scancode, true)
                    .and_then(|index| table.update_mapping(index, entry.keycode, keybits))
            } else {
                Err(Error::InvalidArgument)
            };

            if let Err(e) = res {
                debug!(
                    "{}: cannot load scancode {:#06x}: {e}",
                    map.name, entry.scancode
                );
                table.destroy();
                return Err(e);
            }
        }

        Ok(table)
    }

    /// Free the entries. The table cannot be used for insertion afterwards
    pub fn destroy(&mut self) {
        if self.alloc == 0 {
            return;
        }

        debug!("freed keycode table {}", self.name);

        self.alloc = 0;
        self.scan = Vec::new();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn protocol(&self) -> u32 {
        self.protocol
    }

    pub fn scan_mask(&self) -> u32 {
        self.scan_mask
    }

    /// Mask to apply to scancodes, for hardware which only provides part of
    /// the code. Zero means no mask
    pub fn set_scan_mask(&mut self, scan_mask: u32) {
        self.scan_mask = scan_mask;
    }

    /// Number of entries in use
    pub fn len(&self) -> usize {
        self.scan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scan.is_empty()
    }

    /// Number of entries there is room for
    pub fn size(&self) -> usize {
        self.alloc / ENTRY_SIZE
    }

    pub fn entries(&self) -> &[Entry] {
        &self.scan
    }

    fn mask(&self, scancode: u32) -> u32 {
        if self.scan_mask != 0 {
            scancode & self.scan_mask
        } else {
            scancode
        }
    }

    /// Grow the table if it is full, or shrink it if less than a third is in use
    pub fn resize(&mut self) -> Result<(), Error> {
        let old_alloc = self.alloc;
        let mut new_alloc = old_alloc;

        if old_alloc == 0 {
            return Err(Error::OutOfMemory);
        }

        if self.size() == self.len() {
            if old_alloc >= TABLE_MAX_SIZE {
                return Err(Error::CapacityExhausted);
            }

            new_alloc *= 2;
            debug!("growing table {} to {new_alloc} bytes", self.name);
        }

        if self.len() * 3 < self.size() && old_alloc > TABLE_MIN_SIZE {
            new_alloc /= 2;
            debug!("shrinking table {} to {new_alloc} bytes", self.name);
        }

        if new_alloc == old_alloc {
            return Ok(());
        }

        let mut scan = Vec::new();
        if scan.try_reserve_exact(new_alloc / ENTRY_SIZE).is_err() {
            debug!("failed to allocate {new_alloc} bytes");
            return Err(Error::OutOfMemory);
        }

        scan.extend_from_slice(&self.scan);

        self.scan = scan;
        self.alloc = new_alloc;

        Ok(())
    }

    /// Find the index of a scancode. If it is not present and `insert` is set,
    /// a new entry with [`Key::KEY_RESERVED`] is added at its sorted position,
    /// growing the table if needed.
    pub fn establish(&mut self, scancode: u32, insert: bool) -> Result<usize, Error> {
        let scancode = self.mask(scancode);

        let index = match self.scan.iter().position(|e| e.scancode >= scancode) {
            Some(i) if self.scan[i].scancode == scancode => return Ok(i),
            Some(i) => i,
            None => self.len(),
        };

        if !insert {
            return Err(Error::NotFound);
        }

        if self.size() == self.len() {
            self.resize()?;
        }

        self.scan.insert(
            index,
            Entry {
                scancode,
                keycode: Key::KEY_RESERVED,
            },
        );

        Ok(index)
    }

    /// Binary search for a scancode
    pub fn lookup(&self, scancode: u32) -> Option<usize> {
        let scancode = self.mask(scancode);

        self.scan
            .binary_search_by_key(&scancode, |e| e.scancode)
            .ok()
    }

    /// Keycode for a scancode, [`Key::KEY_RESERVED`] if there is no mapping
    pub fn keycode(&self, scancode: u32) -> Key {
        let keycode = self
            .lookup(scancode)
            .map(|index| self.scan[index].keycode)
            .unwrap_or(Key::KEY_RESERVED);

        if keycode != Key::KEY_RESERVED {
            trace!(
                "{}: scancode {scancode:#06x} keycode {keycode:?}",
                self.name
            );
        }

        keycode
    }

    /// Set the keycode of the entry at `index`. Setting [`Key::KEY_RESERVED`] or
    /// [`Key::KEY_UNKNOWN`] removes the entry. Returns the previous keycode.
    pub fn update_mapping(
        &mut self,
        index: usize,
        keycode: Key,
        keybits: &mut impl KeyBits,
    ) -> Result<Key, Error> {
        let Some(entry) = self.scan.get_mut(index) else {
            return Err(Error::OutOfRange);
        };

        let old_keycode = entry.keycode;
        let deleted = is_unmapped(keycode);

        if deleted {
            debug!("#{index}: deleting scan {:#06x}", entry.scancode);
            self.scan.remove(index);
        } else {
            debug!(
                "#{index}: {} scan {:#06x} with key {keycode:?}",
                if old_keycode == Key::KEY_RESERVED {
                    "new"
                } else {
                    "replacing"
                },
                entry.scancode
            );
            entry.keycode = keycode;
            keybits.set_key(keycode);
        }

        // another scancode might still use the old keycode
        if old_keycode != Key::KEY_RESERVED && !self.scan.iter().any(|e| e.keycode == old_keycode)
        {
            keybits.clear_key(old_keycode);
        }

        if deleted {
            if let Err(e) = self.resize() {
                debug!("cannot shrink table {}: {e}", self.name);
            }
        }

        Ok(old_keycode)
    }

    pub fn get_entry(&self, index: usize) -> Result<Entry, Error> {
        self.scan.get(index).copied().ok_or(Error::OutOfRange)
    }

    /// Look up by scancode. We do not know the valid range of scancodes, so
    /// anything without an entry is reported as [`Key::KEY_RESERVED`].
    pub fn get_entry_by_scancode(&self, scancode: u32) -> Mapping {
        match self.lookup(scancode) {
            Some(index) => Mapping {
                index: Some(index),
                scancode: self.scan[index].scancode,
                keycode: self.scan[index].keycode,
            },
            None => Mapping {
                index: None,
                scancode,
                keycode: Key::KEY_RESERVED,
            },
        }
    }
}
