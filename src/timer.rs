//! One-shot timer running its callback on a dedicated thread. Arming the
//! timer again replaces the pending expiry, so at most one callback is
//! outstanding at any time.

use log::trace;
use std::{
    io,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::Instant,
};

pub struct Timer {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
}

#[derive(Default)]
struct State {
    expires: Option<Instant>,
    shutdown: bool,
}

impl Timer {
    /// Start the timer thread. The timer is not armed
    pub fn new<F>(name: &str, callback: F) -> io::Result<Timer>
    where
        F: Fn() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            cond: Condvar::new(),
        });

        let thread = {
            let shared = shared.clone();

            // thread names cannot contain nul
            thread::Builder::new()
                .name(name.replace('\0', ""))
                .spawn(move || shared.run(callback))?
        };

        Ok(Timer {
            shared,
            thread: Some(thread),
        })
    }

    /// Arm the timer to fire at `expires`, replacing any pending expiry
    pub fn mod_timer(&self, expires: Instant) {
        let mut state = self.shared.lock();

        state.expires = Some(expires);

        self.shared.cond.notify_one();
    }

    /// Cancel a pending expiry. A callback which is already running is not waited for
    pub fn del_timer(&self) {
        self.shared.lock().expires = None;
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.shared.lock().expires.is_some()
    }

    /// Cancel the timer and wait for a running callback to finish. The timer
    /// cannot be armed again
    pub fn del_timer_sync(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        {
            let mut state = self.shared.lock();
            state.expires = None;
            state.shutdown = true;
            self.shared.cond.notify_one();
        }

        if thread.join().is_err() {
            log::error!("timer callback panicked");
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.del_timer_sync();
    }
}

impl Shared {
    /// The callback never runs with the state locked, so a poisoned lock
    /// still holds consistent state
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run<F: Fn()>(&self, callback: F) {
        let mut state = self.lock();

        while !state.shutdown {
            match state.expires {
                None => {
                    state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                Some(expires) => {
                    let now = Instant::now();

                    if expires > now {
                        state = self
                            .cond
                            .wait_timeout(state, expires - now)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0;
                    } else {
                        state.expires = None;
                        drop(state);

                        trace!("timer expired");
                        callback();

                        state = self.lock();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Timer;
    use std::{
        sync::mpsc,
        time::{Duration, Instant},
    };

    #[test]
    fn fires_once() {
        let (tx, rx) = mpsc::channel();

        let timer = Timer::new("test", move || tx.send(Instant::now()).unwrap()).unwrap();

        let start = Instant::now();
        timer.mod_timer(start + Duration::from_millis(20));

        let fired = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(fired >= start + Duration::from_millis(20));
        assert!(!timer.is_pending());

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn rearm_replaces() {
        let (tx, rx) = mpsc::channel();

        let timer = Timer::new("test", move || tx.send(Instant::now()).unwrap()).unwrap();

        let start = Instant::now();
        timer.mod_timer(start + Duration::from_millis(30));
        timer.mod_timer(start + Duration::from_millis(150));

        let fired = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(fired >= start + Duration::from_millis(150));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn nul_in_name() {
        let (tx, rx) = mpsc::channel();

        let timer = Timer::new("rc\0-keyup", move || {
            tx.send(std::thread::current().name().map(String::from)).unwrap()
        })
        .unwrap();

        timer.mod_timer(Instant::now());

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Some(String::from("rc-keyup"))
        );
    }

    #[test]
    fn cancel() {
        let (tx, rx) = mpsc::channel::<()>();

        let mut timer = Timer::new("test", move || tx.send(()).unwrap()).unwrap();

        timer.mod_timer(Instant::now() + Duration::from_millis(30));
        timer.del_timer();
        assert!(!timer.is_pending());
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        timer.mod_timer(Instant::now() + Duration::from_secs(60));
        timer.del_timer_sync();
        timer.del_timer_sync();

        // the callback, and with it the sender, is gone once the thread exits
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        );
    }
}
