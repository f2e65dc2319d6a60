//! Turn a stream of received scancodes into key down and key up events.
//!
//! Remotes keep sending the same scancode while a button is held, and there
//! is no message when the button is released. A key is considered down until
//! no scancode for it has been received for the keypress timeout.

use crate::{input::InputSink, timer::Timer};
use evdev::Key;
use log::debug;
use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::{Duration, Instant},
};

/// Default time after the last scancode before the key is released
pub const KEYPRESS_TIMEOUT: Duration = Duration::from_millis(250);

struct KeyState {
    keypressed: bool,
    last_scancode: u32,
    last_toggle: u8,
    last_keycode: Key,
    keyup_deadline: Instant,
}

struct Shared {
    name: String,
    state: Mutex<KeyState>,
    sink: Arc<dyn InputSink>,
}

/// Key press state of a single device
pub struct Keypress {
    shared: Arc<Shared>,
    timer: Timer,
    timeout: Duration,
}

impl Keypress {
    pub fn new(name: &str, sink: Arc<dyn InputSink>, timeout: Duration) -> io::Result<Self> {
        if Instant::now().checked_add(timeout).is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("keypress timeout {timeout:?} is too large"),
            ));
        }

        let shared = Arc::new(Shared {
            name: name.to_owned(),
            state: Mutex::new(KeyState {
                keypressed: false,
                last_scancode: 0,
                last_toggle: 0,
                last_keycode: Key::KEY_RESERVED,
                keyup_deadline: Instant::now(),
            }),
            sink,
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);

        let timer = Timer::new(&format!("{name}-keyup"), move || {
            // the device may be going away
            if let Some(shared) = weak.upgrade() {
                shared.timer_keyup();
            }
        })?;

        Ok(Keypress {
            shared,
            timer,
            timeout,
        })
    }

    /// A scancode was received. `keycode` is what the scancode maps to, or
    /// [`Key::KEY_RESERVED`] if it is not mapped. The toggle value is protocol
    /// dependent; protocols without toggle should pass zero.
    pub fn keydown(&self, scancode: u32, toggle: u8, keycode: Key) {
        let mut state = self.shared.lock();

        self.shared.sink.scan_observed(scancode);

        let repeat = state.keypressed
            && state.last_scancode == scancode
            && state.last_toggle == toggle;

        if !repeat {
            // release old keypress
            self.shared.keyup(&mut state);

            state.last_scancode = scancode;
            state.last_toggle = toggle;
            state.last_keycode = keycode;

            if keycode == Key::KEY_RESERVED {
                return;
            }

            state.keypressed = true;
            debug!(
                "{}: key down event, key {keycode:?}, scancode {scancode:#06x}",
                self.shared.name
            );
            self.shared.sink.key_down(keycode);
        }

        self.set_timer(&mut state);
    }

    /// The decoder received a repeat message which does not carry the scancode
    pub fn repeat(&self) {
        let mut state = self.shared.lock();

        self.shared.sink.scan_observed(state.last_scancode);

        if state.keypressed {
            self.set_timer(&mut state);
        }
    }

    /// Release the key now, if one is pressed
    pub fn keyup(&self) {
        let mut state = self.shared.lock();

        self.shared.keyup(&mut state);
        self.timer.del_timer();
    }

    /// Called when the keyup timer expires. Does nothing if the deadline was
    /// moved into the future after the timer fired
    pub fn timer_keyup(&self) {
        self.shared.timer_keyup();
    }

    pub fn is_pressed(&self) -> bool {
        self.shared.lock().keypressed
    }

    /// The key currently held down, if any
    pub fn pressed_key(&self) -> Option<Key> {
        let state = self.shared.lock();

        state.keypressed.then_some(state.last_keycode)
    }

    /// Stop the keyup timer, waiting for it if it is running, and release any
    /// key still held down
    pub fn shutdown(&mut self) {
        self.timer.del_timer_sync();

        let mut state = self.shared.lock();

        self.shared.keyup(&mut state);
    }

    fn set_timer(&self, state: &mut KeyState) {
        let Some(deadline) = Instant::now().checked_add(self.timeout) else {
            debug!("{}: keyup deadline out of range", self.shared.name);
            return;
        };

        state.keyup_deadline = deadline;
        self.timer.mod_timer(deadline);
    }
}

impl Shared {
    /// The key state is consistent at every sink call, so a lock poisoned by
    /// a panicking sink is still usable
    fn lock(&self) -> MutexGuard<'_, KeyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn keyup(&self, state: &mut KeyState) {
        if !state.keypressed {
            return;
        }

        debug!("{}: keyup key {:?}", self.name, state.last_keycode);
        state.keypressed = false;
        self.sink.key_up(state.last_keycode);
    }

    fn timer_keyup(&self) {
        let mut state = self.lock();

        // a scancode may have arrived between the timer firing and us taking
        // the lock, in which case the timer has been moved further out
        if state.keyup_deadline <= Instant::now() {
            self.keyup(&mut state);
        }
    }
}
