use crate::task::ExitReason;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Wake, Waker};

#[derive(Debug, Default)]
pub(crate) struct WakeCounter {
    count: AtomicUsize,
}

impl WakeCounter {
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

impl Wake for WakeCounter {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }
}

pub(crate) fn mock_waker() -> (Waker, Arc<WakeCounter>) {
    let counter = Arc::new(WakeCounter::default());
    (Waker::from(Arc::clone(&counter)), counter)
}

/// Held across a suspension point; records the latent exit reason visible
/// when the coroutine body is dropped.
#[derive(Debug, Clone, Default)]
pub(crate) struct DropProbe {
    seen: Arc<Mutex<Option<Option<ExitReason>>>>,
}

impl DropProbe {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_dropped(&self) -> bool {
        self.seen.lock().is_some()
    }

    /// `None` while not dropped yet.
    pub(crate) fn seen(&self) -> Option<Option<ExitReason>> {
        *self.seen.lock()
    }

    /// Value to move into the coroutine.
    pub(crate) fn arm(&self) -> ArmedProbe {
        ArmedProbe {
            seen: Arc::clone(&self.seen),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ArmedProbe {
    seen: Arc<Mutex<Option<Option<ExitReason>>>>,
}

impl Drop for ArmedProbe {
    fn drop(&mut self) {
        *self.seen.lock() = Some(crate::latent::exit_reason());
    }
}
