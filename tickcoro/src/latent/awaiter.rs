use crate::context;
use crate::runtime::Handle;
use crate::task::FrameHandle;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

type Check = Box<dyn FnMut() -> bool + Send + 'static>;

/// Readiness condition evaluated once per tick on the main thread.
pub(crate) struct LatentCondition {
    check: Mutex<Check>,
    done: AtomicBool,

    /// The awaiter went away before the condition held.
    abandoned: AtomicBool,

    /// Only used outside of frame-tracked coroutines.
    waker: Mutex<Option<Waker>>,
}

impl LatentCondition {
    fn new(check: Check) -> Arc<Self> {
        Arc::new(LatentCondition {
            check: Mutex::new(check),
            done: AtomicBool::new(false),
            abandoned: AtomicBool::new(false),
            waker: Mutex::new(None),
        })
    }

    /// Evaluates the condition. Once it held, it holds forever.
    pub(crate) fn should_resume(&self) -> bool {
        if self.is_done() {
            return true;
        }

        let ready = (self.check.lock())();
        if ready {
            self.done.store(true, Ordering::Release);
        }
        ready
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub(crate) fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    pub(crate) fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);

        // Dropped outside the lock, it may own the frame that owns us.
        let waker = self.waker.lock().take();
        drop(waker);
    }

    fn set_waker(&self, waker: &Waker) {
        let mut slot = self.waker.lock();
        match slot.as_ref() {
            Some(curr) if curr.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }

    pub(crate) fn wake(&self) {
        let waker = self.waker.lock().take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl fmt::Debug for LatentCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatentCondition")
            .field("done", &self.is_done())
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}

/// Future that completes on the main thread once a condition holds.
///
/// Inside a frame-tracked coroutine the condition is checked by the
/// coroutine's pending action on every tick. Anywhere else it is checked by
/// the world at the end of every tick, and the waiting coroutine is woken from
/// the main thread.
///
/// # Panics
///
/// Polling it off the main thread panics in a frame-tracked coroutine.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct LatentAwaiter {
    cond: Arc<LatentCondition>,
    checked: bool,
    registered: bool,
}

impl LatentAwaiter {
    fn new(check: impl FnMut() -> bool + Send + 'static) -> Self {
        LatentAwaiter {
            cond: LatentCondition::new(Box::new(check)),
            checked: false,
            registered: false,
        }
    }
}

impl Future for LatentAwaiter {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.cond.is_done() {
            return Poll::Ready(());
        }

        // One check before suspending, then only the tick loop checks.
        if !self.checked {
            self.checked = true;
            if self.cond.should_resume() {
                return Poll::Ready(());
            }
        }

        match context::current_frame() {
            Some(FrameHandle::Latent(promise)) => {
                promise.set_current_awaiter(Arc::clone(&self.cond));
            }
            _ => {
                self.cond.set_waker(cx.waker());
                if !self.registered {
                    self.registered = true;
                    Handle::current().register_latent_waiter(Arc::clone(&self.cond));
                }
            }
        }

        Poll::Pending
    }
}

impl Drop for LatentAwaiter {
    fn drop(&mut self) {
        if !self.cond.is_done() {
            self.cond.abandon();
        }
    }
}

impl fmt::Debug for LatentAwaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatentAwaiter")
            .field("cond", &self.cond)
            .finish()
    }
}

/// Resumes on the next tick.
pub fn next_tick() -> LatentAwaiter {
    ticks(1)
}

/// Resumes after `count` ticks. `ticks(0)` does not suspend.
pub fn ticks(count: u64) -> LatentAwaiter {
    // The first evaluation happens before suspending, not on a tick.
    let mut evaluations = 0u64;
    LatentAwaiter::new(move || {
        let ready = evaluations >= count;
        evaluations += 1;
        ready
    })
}

/// Resumes on the first tick where `pred` returns true, checking once right
/// away.
pub fn until<F>(pred: F) -> LatentAwaiter
where
    F: FnMut() -> bool + Send + 'static,
{
    LatentAwaiter::new(pred)
}

/// Resumes on the first tick at least `duration` after this call. A
/// duration too large to represent as an `Instant` never elapses.
pub fn delay(duration: Duration) -> LatentAwaiter {
    match Instant::now().checked_add(duration) {
        Some(deadline) => LatentAwaiter::new(move || Instant::now() >= deadline),
        None => LatentAwaiter::new(|| false),
    }
}

/// Same as [`delay`], in fractional seconds. Negative values and NaN do not
/// suspend; infinite or out of range values never elapse.
pub fn seconds(secs: f64) -> LatentAwaiter {
    if secs.is_nan() || secs <= 0.0 {
        return delay(Duration::ZERO);
    }
    delay(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}
