use crate::context;
use crate::runtime::Handle;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadKind {
    Main,
    Worker,
}

impl ThreadKind {
    fn of_current(world: &Handle) -> Self {
        if world.is_main_thread() {
            ThreadKind::Main
        } else {
            ThreadKind::Worker
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Ready as soon as the coroutine runs on the target kind of thread.
    Hop,

    /// Goes through the target thread's queue once.
    Yield,
}

/// Future that resumes the awaiting coroutine on another kind of thread.
///
/// The dispatch only happens once the coroutine has suspended, so the target
/// thread never resumes it while the suspending poll is still running. A
/// frame-tracked coroutine leaving the main thread detaches from it.
///
/// # Panics
///
/// Panics when polled on a thread that does not belong to a world.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct MoveToThread {
    target: Option<ThreadKind>,
    mode: Mode,

    /// Set by the dispatched job right before it wakes the coroutine.
    fired: Option<Arc<AtomicBool>>,
}

/// Continues on the main thread. Ready immediately when already there.
pub fn move_to_main() -> MoveToThread {
    MoveToThread {
        target: Some(ThreadKind::Main),
        mode: Mode::Hop,
        fired: None,
    }
}

/// Continues on a worker thread. Ready immediately when already on one.
pub fn move_to_worker() -> MoveToThread {
    MoveToThread {
        target: Some(ThreadKind::Worker),
        mode: Mode::Hop,
        fired: None,
    }
}

/// Suspends once and continues on the same kind of thread: through the main
/// queue on the main thread, on a fresh worker otherwise.
pub fn yield_now() -> MoveToThread {
    MoveToThread {
        target: None,
        mode: Mode::Yield,
        fired: None,
    }
}

impl Future for MoveToThread {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let world = Handle::current();
        let current = ThreadKind::of_current(&world);
        let target = *self.target.get_or_insert(current);

        let fired = self.fired.as_ref().map(|f| f.load(Ordering::Acquire));
        if current == target {
            match self.mode {
                Mode::Hop => return Poll::Ready(()),
                Mode::Yield if fired == Some(true) => return Poll::Ready(()),
                Mode::Yield => {}
            }
        }

        if target == ThreadKind::Worker {
            if let Some(frame) = context::current_frame() {
                frame.detach_from_main();
            }
        }

        // Re-dispatch only when the previous job already ran and we still
        // ended up on the wrong thread.
        let dispatch = match &self.fired {
            None => true,
            Some(fired) => fired.swap(false, Ordering::AcqRel),
        };
        if !dispatch {
            return Poll::Pending;
        }

        let fired = Arc::clone(
            self.fired
                .get_or_insert_with(|| Arc::new(AtomicBool::new(false))),
        );
        let waker = cx.waker().clone();
        context::defer_after_suspend(Box::new(move || {
            let job = move || {
                fired.store(true, Ordering::Release);
                waker.wake();
            };

            match target {
                ThreadKind::Main => world.run_on_main(job),
                ThreadKind::Worker => world.run_on_worker(job),
            }
        }));

        Poll::Pending
    }
}
