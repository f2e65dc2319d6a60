//! Map infrared remote control scancodes to keycodes, and turn received
//! scancodes into key down and key up events.
//!
//! A [`rcdev::RcDevice`] owns a sorted [`keytable::ScancodeTable`] and the key
//! press state of one remote controller. Decoders report scancodes with
//! [`rcdev::RcDevice::keydown`]; the device looks up the keycode and sends
//! events to an [`input::InputSink`]. A key is released when no scancode for
//! it arrives within the keypress timeout.
//!
//! ```
//! use evdev::Key;
//! use ir_keytable::{
//!     input::InputEvent,
//!     keytable::{Entry, RcMap},
//!     rcdev::{Config, RcDevice},
//! };
//! use std::sync::{mpsc, Arc};
//!
//! let map = RcMap {
//!     name: String::from("rc-hauppauge"),
//!     protocol: 2,
//!     scan: vec![Entry { scancode: 0x1e3b, keycode: Key::KEY_SELECT }],
//! };
//!
//! let (tx, rx) = mpsc::channel::<InputEvent>();
//! let dev = RcDevice::register(&map, None, "rc0", Arc::new(tx), Config::default())
//!     .expect("register should succeed");
//!
//! dev.keydown(0x1e3b, 0);
//!
//! assert_eq!(rx.recv().unwrap(), InputEvent::Scan(0x1e3b));
//! assert_eq!(rx.recv().unwrap(), InputEvent::KeyDown(Key::KEY_SELECT));
//! ```

mod error;
pub mod input;
pub mod keymap;
pub mod keypress;
pub mod keytable;
pub mod rcdev;
mod timer;

pub use error::Error;
