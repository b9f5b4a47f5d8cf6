//! Per-thread execution context.
//!
//! Tracks which world the current thread belongs to, which coroutine frames
//! are being polled on it, and the exit reason of a frame being destroyed.

use crate::runtime::{Handle, Job};
use crate::task::{ExitReason, FrameHandle};
use crate::utils::ScopeGuard;
use std::cell::RefCell;
use std::thread_local;

struct Context {
    world: Option<Handle>,

    /// Frames currently being polled on this thread, innermost last. Frames
    /// nest when a poll fires a continuation that resumes another frame
    /// inline.
    resume_stack: Vec<ResumeEntry>,

    exit_reason: Option<ExitReason>,
}

struct ResumeEntry {
    frame: FrameHandle,

    /// Actions to run once the frame has suspended.
    deferred: Vec<Job>,
}

thread_local! {
    static CONTEXT: RefCell<Context> = const {
        RefCell::new(Context {
            world: None,
            resume_stack: Vec::new(),
            exit_reason: None,
        })
    };
}

/// Installs `world` for this thread, returning the previous one.
pub(crate) fn set_world(world: Option<Handle>) -> Option<Handle> {
    CONTEXT.with(|ctx| std::mem::replace(&mut ctx.borrow_mut().world, world))
}

pub(crate) fn try_world() -> Option<Handle> {
    CONTEXT.with(|ctx| ctx.borrow().world.clone())
}

pub(crate) fn current_frame() -> Option<FrameHandle> {
    CONTEXT.with(|ctx| ctx.borrow().resume_stack.last().map(|e| e.frame.clone()))
}

/// Pushes `frame` on this thread's resume stack for the lifetime of the
/// returned guard.
pub(crate) fn enter_frame(frame: FrameHandle) -> ResumeGuard {
    CONTEXT.with(|ctx| {
        ctx.borrow_mut().resume_stack.push(ResumeEntry {
            frame,
            deferred: Vec::new(),
        })
    });
    ResumeGuard { _p: () }
}

/// Queues `job` to run right after the frame being polled has suspended. Runs
/// it immediately when no frame is being polled on this thread.
///
/// Awaiters that hand their waker to another thread go through this, so the
/// other thread can never resume the frame while the suspending poll is still
/// on the stack.
pub(crate) fn defer_after_suspend(job: Job) {
    let job = CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        match ctx.resume_stack.last_mut() {
            Some(entry) => {
                entry.deferred.push(job);
                None
            }
            None => Some(job),
        }
    });

    if let Some(job) = job {
        job();
    }
}

pub(crate) fn exit_reason() -> Option<ExitReason> {
    CONTEXT.with(|ctx| ctx.borrow().exit_reason)
}

/// Runs `f` with `reason` visible through [`exit_reason`].
pub(crate) fn with_exit_reason<R>(reason: ExitReason, f: impl FnOnce() -> R) -> R {
    let prev = CONTEXT.with(|ctx| ctx.borrow_mut().exit_reason.replace(reason));
    let _restore = ScopeGuard::new(move || {
        CONTEXT.with(|ctx| ctx.borrow_mut().exit_reason = prev);
    });
    f()
}

pub(crate) struct ResumeGuard {
    _p: (),
}

impl Drop for ResumeGuard {
    fn drop(&mut self) {
        let entry = CONTEXT.with(|ctx| ctx.borrow_mut().resume_stack.pop());
        let Some(entry) = entry else {
            return;
        };

        // The borrow is released, jobs are free to re-enter the context.
        for job in entry.deferred {
            job();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::async_promise::AsyncPromise;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dummy_frame() -> FrameHandle {
        FrameHandle::Async(AsyncPromise::new(Box::pin(async {})))
    }

    #[test]
    fn test_deferred_runs_after_guard() {
        let ran = Arc::new(AtomicUsize::new(0));

        let guard = enter_frame(dummy_frame());
        defer_after_suspend(Box::new({
            let ran = Arc::clone(&ran);
            move || {
                // Already popped by the time this runs.
                assert!(current_frame().is_none());
                ran.fetch_add(1, Ordering::Relaxed);
            }
        }));
        assert_eq!(ran.load(Ordering::Relaxed), 0);
        assert!(current_frame().is_some());

        drop(guard);
        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_deferred_without_frame_runs_now() {
        let ran = Arc::new(AtomicUsize::new(0));
        defer_after_suspend(Box::new({
            let ran = Arc::clone(&ran);
            move || {
                ran.fetch_add(1, Ordering::Relaxed);
            }
        }));
        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_exit_reason_is_scoped() {
        assert_eq!(exit_reason(), None);
        with_exit_reason(ExitReason::ActionAborted, || {
            assert_eq!(exit_reason(), Some(ExitReason::ActionAborted));
            with_exit_reason(ExitReason::Canceled, || {
                assert_eq!(exit_reason(), Some(ExitReason::Canceled));
            });
            assert_eq!(exit_reason(), Some(ExitReason::ActionAborted));
        });
        assert_eq!(exit_reason(), None);
    }
}
