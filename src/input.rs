//! Collaborators of the rc core: the sink receiving input events and the
//! bitmap of keys a device can generate.

use evdev::{AttributeSet, Key};
use std::sync::mpsc::Sender;

/// Highest keycode an input device can report
pub const KEY_MAX: u16 = 0x2ff;

/// Returns true if the keycode means "no mapping"
pub fn is_unmapped(key: Key) -> bool {
    key == Key::KEY_RESERVED || key == Key::KEY_UNKNOWN
}

/// Returns true if the keycode fits in the key bitmap of an input device
pub fn is_valid_keycode(key: Key) -> bool {
    key.code() <= KEY_MAX
}

/// An event produced by the rc core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A scancode was received, whether it is mapped or not
    Scan(u32),
    KeyDown(Key),
    KeyUp(Key),
}

/// Receiver of the events for a single device. Events are delivered in the
/// order they are produced.
pub trait InputSink: Send + Sync {
    fn scan_observed(&self, scancode: u32);
    fn key_down(&self, key: Key);
    fn key_up(&self, key: Key);
}

impl InputSink for Sender<InputEvent> {
    // a disconnected receiver is not our problem
    fn scan_observed(&self, scancode: u32) {
        let _ = self.send(InputEvent::Scan(scancode));
    }

    fn key_down(&self, key: Key) {
        let _ = self.send(InputEvent::KeyDown(key));
    }

    fn key_up(&self, key: Key) {
        let _ = self.send(InputEvent::KeyUp(key));
    }
}

/// Record of which keycodes are reachable through some scancode mapping
pub trait KeyBits {
    fn set_key(&mut self, key: Key);
    fn clear_key(&mut self, key: Key);
}

impl KeyBits for AttributeSet<Key> {
    fn set_key(&mut self, key: Key) {
        self.insert(key);
    }

    fn clear_key(&mut self, key: Key) {
        self.remove(key);
    }
}

#[test]
fn sentinels() {
    assert!(is_unmapped(Key::KEY_RESERVED));
    assert!(is_unmapped(Key::KEY_UNKNOWN));
    assert!(!is_unmapped(Key::KEY_A));

    assert!(is_valid_keycode(Key::KEY_POWER));
    assert!(!is_valid_keycode(Key::new(KEY_MAX + 1)));
}

#[test]
fn attribute_set_bits() {
    let mut bits = AttributeSet::<Key>::new();

    bits.set_key(Key::KEY_VOLUMEUP);
    assert!(bits.contains(Key::KEY_VOLUMEUP));

    bits.clear_key(Key::KEY_VOLUMEUP);
    assert!(!bits.contains(Key::KEY_VOLUMEUP));
}
