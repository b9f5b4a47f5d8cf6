use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Manual-reset event. Once set, every current and future waiter returns.
#[derive(Debug, Default)]
pub(crate) struct Event {
    set: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self) {
        let mut set = self.set.lock();
        *set = true;
        self.cond.notify_all();
    }

    pub(crate) fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Blocks until the event is set or `timeout` elapses. `None` waits
    /// forever. Returns whether the event was set.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut set = self.set.lock();
        match timeout {
            None => {
                while !*set {
                    self.cond.wait(&mut set);
                }
                true
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !*set {
                    if self.cond.wait_until(&mut set, deadline).timed_out() {
                        break;
                    }
                }
                *set
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_event_wakes_waiter() {
        let event = Arc::new(Event::new());
        let waiter = thread::spawn({
            let event = Arc::clone(&event);
            move || event.wait(None)
        });

        event.set();
        assert!(matches!(waiter.join(), Ok(true)));
        assert!(event.is_set());
    }

    #[test]
    fn test_event_times_out() {
        let event = Event::new();
        assert!(!event.wait(Some(Duration::from_millis(5))));
    }
}
